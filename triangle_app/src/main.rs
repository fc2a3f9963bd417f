//! Textured quad demo
//!
//! Spins a vertex-colored, textured quad using per-frame uniform buffers and
//! one descriptor set per frame slot. Resize or minimize the window to
//! exercise swapchain recreation.
//!
//! Usage: `textured_quad [config.toml|config.ron] [texture.png]`

use ash::vk;
use bytemuck::{Pod, Zeroable};
use nalgebra::{Matrix4, Point3, Vector3};
use rust_renderer::prelude::*;
use rust_renderer::render::vulkan::WindowError;
use std::time::Instant;
use thiserror::Error;

#[derive(Error, Debug)]
enum AppError {
    #[error(transparent)]
    Vulkan(#[from] VulkanError),
    #[error(transparent)]
    Window(#[from] WindowError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct QuadVertex {
    position: [f32; 2],
    color: [f32; 3],
    tex_coord: [f32; 2],
}

impl VertexLayout for QuadVertex {
    fn binding_description() -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription {
            binding: 0,
            stride: std::mem::size_of::<Self>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        }
    }

    fn attribute_descriptions() -> Vec<vk::VertexInputAttributeDescription> {
        vec![
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 0,
                format: vk::Format::R32G32_SFLOAT,
                offset: 0,
            },
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 1,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: 8,
            },
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 2,
                format: vk::Format::R32G32_SFLOAT,
                offset: 20,
            },
        ]
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct Transform {
    mvp: [[f32; 4]; 4],
}

impl Transform {
    fn at(seconds: f32, aspect: f32) -> Self {
        let model = Matrix4::from_axis_angle(&Vector3::z_axis(), seconds * std::f32::consts::FRAC_PI_2);
        let view = Matrix4::look_at_rh(
            &Point3::new(2.0, 2.0, 2.0),
            &Point3::origin(),
            &Vector3::z(),
        );
        let mut projection = Matrix4::new_perspective(aspect, 45f32.to_radians(), 0.1, 10.0);
        // Clip space Y points down
        projection[(1, 1)] *= -1.0;

        Self {
            mvp: (projection * view * model).into(),
        }
    }
}

const VERTICES: [QuadVertex; 4] = [
    QuadVertex { position: [-0.5, -0.5], color: [1.0, 0.0, 0.0], tex_coord: [1.0, 0.0] },
    QuadVertex { position: [0.5, -0.5], color: [0.0, 1.0, 0.0], tex_coord: [0.0, 0.0] },
    QuadVertex { position: [0.5, 0.5], color: [0.0, 0.0, 1.0], tex_coord: [0.0, 1.0] },
    QuadVertex { position: [-0.5, 0.5], color: [1.0, 1.0, 1.0], tex_coord: [1.0, 1.0] },
];

const INDICES: [u32; 6] = [0, 1, 2, 2, 3, 0];

fn checkerboard(size: u32, cell: u32) -> Vec<u8> {
    (0..size * size)
        .flat_map(|i| {
            let (x, y) = (i % size, i / size);
            if (x / cell + y / cell) % 2 == 0 {
                [235, 235, 235, 255]
            } else {
                [40, 40, 40, 255]
            }
        })
        .collect()
}

fn load_config() -> Result<RendererConfig, AppError> {
    let config = match std::env::args().nth(1) {
        Some(path) => RendererConfig::load_from_file(path)?,
        None => RendererConfig::new("Textured Quad")
            .with_window(WindowConfig {
                title: "Rust Renderer - Textured Quad".to_string(),
                ..WindowConfig::default()
            })
            .with_shaders(ShaderConfig::new(
                concat!(env!("CARGO_MANIFEST_DIR"), "/shaders/quad.vert.spv"),
                concat!(env!("CARGO_MANIFEST_DIR"), "/shaders/quad.frag.spv"),
            ))
            .with_clear_color([0.02, 0.02, 0.05, 1.0]),
    };
    config.validate()?;
    Ok(config)
}

fn run() -> Result<(), AppError> {
    let config = load_config()?;
    rust_renderer::foundation::logging::init(&config.logging);
    log::info!("Starting textured quad demo");

    let mut window = Window::new(&config.window)?;
    let pipeline = PipelineDescription::from_shader_config(&config.shaders)?
        .with_vertex_layout::<QuadVertex>()
        .with_culling(vk::CullModeFlags::NONE, vk::FrontFace::COUNTER_CLOCKWISE);
    let mut renderer = Renderer::initialize(&mut window, &config, pipeline)?;

    let uploader = renderer.uploader();
    let memory = renderer.memory();

    let vertices = VertexBuffer::new(&uploader, &VERTICES)?;
    let indices = IndexBuffer::new(&uploader, &INDICES)?;
    let texture = match std::env::args().nth(2) {
        Some(path) => Texture::from_file(&uploader, path)?,
        None => Texture::from_rgba8(&uploader, &checkerboard(64, 8), 64, 64)?,
    };
    let uniforms = UniformBuffer::<Transform>::per_frame(&memory, renderer.frames_in_flight())?;

    let descriptor_pool = renderer.create_descriptor_pool()?;
    let descriptor_sets = descriptor_pool.allocate(renderer.descriptor_set_layout(), uniforms.len())?;
    for (set, uniform) in descriptor_sets.iter().zip(&uniforms) {
        descriptor_pool.write_uniform_and_texture(*set, uniform, &texture);
    }

    let draws = [DrawCommand::new(&vertices)
        .with_indices(&indices)
        .with_descriptor_sets(descriptor_sets)];

    let start = Instant::now();
    let mut frames = 0u64;
    while !window.should_close() {
        window.poll_events();

        let status = renderer.draw_frame(&mut window, &draws, |memory, frame| {
            let aspect = frame.extent.width as f32 / frame.extent.height.max(1) as f32;
            uniforms[frame.frame_index].update(memory, &Transform::at(start.elapsed().as_secs_f32(), aspect))
        })?;

        if status == FrameStatus::Recreated {
            log::info!("Swapchain recreated: {:?}", renderer.swapchain_extent());
        }
        frames += 1;
    }

    let elapsed = start.elapsed().as_secs_f64();
    log::info!("Rendered {} frames in {:.1}s ({:.1} fps)", frames, elapsed, frames as f64 / elapsed.max(f64::EPSILON));

    renderer.context().wait_idle()?;
    let memory = renderer.memory();
    drop(descriptor_pool);
    uniforms.into_iter().for_each(|uniform| uniform.destroy(&memory));
    texture.destroy(&memory);
    indices.destroy(&memory);
    vertices.destroy(&memory);

    renderer.cleanup()?;
    Ok(())
}

fn main() {
    if let Err(e) = run() {
        log::error!("Application error: {}", e);
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}
