// build.rs
// Compiles the demo's GLSL shaders to SPIR-V next to their sources

use std::env;
use std::path::{Path, PathBuf};
use std::process::Command;

fn compile(glslc: &Path, source: &Path) -> bool {
    let mut output = source.as_os_str().to_owned();
    output.push(".spv");
    let output = PathBuf::from(output);

    let up_to_date = match (std::fs::metadata(source), std::fs::metadata(&output)) {
        (Ok(src), Ok(dst)) => match (src.modified(), dst.modified()) {
            (Ok(src), Ok(dst)) => dst >= src,
            _ => false,
        },
        _ => false,
    };
    if up_to_date {
        return false;
    }

    let status = Command::new(glslc).arg(source).arg("-o").arg(&output).status();
    match status {
        Ok(s) if s.success() => {
            eprintln!("info: Compiled {} -> {}", source.display(), output.display());
            true
        }
        Ok(s) => panic!("glslc failed for {} with exit code {:?}", source.display(), s.code()),
        Err(e) => panic!("Failed to run glslc for {}: {}", source.display(), e),
    }
}

fn main() {
    println!("cargo:rerun-if-changed=shaders");
    println!("cargo:rerun-if-env-changed=VULKAN_SDK");
    println!("cargo:rerun-if-env-changed=SKIP_SHADERS");

    if env::var("SKIP_SHADERS").is_ok() {
        eprintln!("info: Skipping shader compilation (SKIP_SHADERS set)");
        return;
    }

    let Ok(vulkan_sdk) = env::var("VULKAN_SDK") else {
        eprintln!("warning: VULKAN_SDK not set, shader compilation skipped");
        return;
    };

    let glslc = if cfg!(target_os = "windows") {
        PathBuf::from(vulkan_sdk).join("Bin").join("glslc.exe")
    } else {
        PathBuf::from(vulkan_sdk).join("bin").join("glslc")
    };
    if !glslc.exists() {
        eprintln!("warning: glslc not found at {}, shader compilation skipped", glslc.display());
        return;
    }

    let Ok(entries) = std::fs::read_dir("shaders") else {
        eprintln!("info: No shader directory found");
        return;
    };

    let compiled = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| matches!(path.extension().and_then(|e| e.to_str()), Some("vert" | "frag")))
        .filter(|path| compile(&glslc, path))
        .count();

    eprintln!("info: Compiled {} shader(s)", compiled);
}
