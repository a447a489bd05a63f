//! Spinning-triangle demo
//!
//! Exercises the full frame path: swapchain render pass, graphics
//! pipeline with a vertex buffer, and a per-frame uniform ring bound
//! through the shader resource manager. Shaders are loaded as SPIR-V at
//! runtime; run `shaders/compile.sh` once before starting.

use std::path::{Path, PathBuf};
use std::time::Instant;

use ash::vk;
use ember_engine::prelude::*;
use ember_engine::render::vulkan::shader::read_spirv_file;
use ember_engine::render::vulkan::{
    GraphicsPipeline, PipelineSpecification, RenderPass, Shader, ShaderResource,
    ShaderResourceKind, ShaderResourceManager, ShaderResourceManagerSpecification,
    ShaderResourceMetadata, ShaderSpecification, ShaderStage, UniformBufferRing, VertexBuffer,
    VertexLayout,
};
use nalgebra::{Matrix4, Vector3};

#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct Vertex {
    position: [f32; 2],
    colour: [f32; 3],
}

const VERTICES: [Vertex; 3] = [
    Vertex {
        position: [0.0, -0.6],
        colour: [1.0, 0.2, 0.2],
    },
    Vertex {
        position: [0.6, 0.6],
        colour: [0.2, 1.0, 0.2],
    },
    Vertex {
        position: [-0.6, 0.6],
        colour: [0.2, 0.2, 1.0],
    },
];

fn shader_path(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("shaders")
        .join(name)
}

fn load_spirv(name: &str) -> Result<Vec<u32>, String> {
    let path = shader_path(name);
    read_spirv_file(&path).map_err(|e| {
        format!(
            "failed to load {} ({}); run triangle_app/shaders/compile.sh first",
            path.display(),
            e
        )
    })
}

fn main() {
    ember_engine::foundation::logging::init();
    if let Err(e) = run() {
        log::error!("{}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = RendererConfig::load_or_default("renderer.toml");
    let mut window = Window::new("Ember triangle", 1280, 720)?;
    let mut renderer = RendererContext::new(&window, "triangle_app", &config)?;
    let device = renderer.device().clone();

    let vert = load_spirv("triangle.vert.spv")?;
    let frag = load_spirv("triangle.frag.spv")?;
    let shader = Shader::new(
        device.clone(),
        ShaderSpecification {
            name: "triangle".to_string(),
            stages: vec![(ShaderStage::Vertex, vert), (ShaderStage::Fragment, frag)],
            resources: vec![ShaderResourceMetadata {
                name: "transform".to_string(),
                set: 0,
                binding: 0,
                kind: ShaderResourceKind::UniformBuffer,
                array_length: 1,
                stages: vk::ShaderStageFlags::VERTEX,
            }],
        },
    )?;

    let mut render_pass = RenderPass::for_swapchain(
        device.clone(),
        renderer.swapchain(),
        renderer.clear_colour(),
        None,
    )?;

    let pipeline = GraphicsPipeline::new(
        device.clone(),
        &shader,
        &render_pass,
        &PipelineSpecification {
            vertex_layout: VertexLayout::new(std::mem::size_of::<Vertex>() as u32)
                .attribute(vk::Format::R32G32_SFLOAT, 0)
                .attribute(vk::Format::R32G32B32_SFLOAT, 8),
            depth_test: false,
            depth_write: false,
            cull_mode: vk::CullModeFlags::NONE,
            ..Default::default()
        },
    )?;

    let vertex_buffer = VertexBuffer::new(device.clone(), &VERTICES)?;

    let frames = renderer.frames_in_flight();
    let mut transforms = UniformBufferRing::new(
        device.clone(),
        std::mem::size_of::<Matrix4<f32>>() as u64,
        frames,
    )?;

    let mut resources = ShaderResourceManager::new(
        device.clone(),
        &shader,
        &ShaderResourceManagerSpecification {
            first_set: 0,
            last_set: 0,
            frames_in_flight: frames,
        },
    )?;
    resources.set("transform", ShaderResource::UniformBufferRing(&transforms))?;

    let start = Instant::now();
    while !window.should_close() {
        window.poll_events();
        let events: Vec<_> = window.flush_events().collect();
        for (_, event) in events {
            match event {
                glfw::WindowEvent::FramebufferSize(width, height) => {
                    renderer.signal_resize(width as u32, height as u32);
                }
                glfw::WindowEvent::Key(glfw::Key::Escape, _, glfw::Action::Press, _) => {
                    window.set_should_close(true);
                }
                _ => {}
            }
        }

        match renderer.begin_frame()? {
            FrameStatus::SwapchainStale => {
                render_pass.rebuild_for_swapchain(renderer.swapchain(), None)?;
                continue;
            }
            FrameStatus::Ready => {}
        }

        // This frame slot's fence has been waited, so its uniform buffer
        // is safe to overwrite
        let frame = renderer.current_frame_index();
        let angle = start.elapsed().as_secs_f32();
        let mvp = Matrix4::new_rotation(Vector3::z() * angle);
        transforms.set_data(frame, bytemuck::cast_slice(mvp.as_slice()), 0)?;
        resources.process_changes();

        let image_index = renderer
            .current_image_index()
            .expect("begin_frame reported Ready") as usize;
        let recorder = renderer.recorder()?;
        let mut pass = recorder.begin_render_pass(&render_pass, image_index);
        pass.bind_pipeline(&pipeline);
        pass.bind_shader_resources(&pipeline, &resources, frame)?;
        pass.bind_vertex_buffer(&vertex_buffer);
        pass.draw(VERTICES.len() as u32, 1);
        pass.end();

        // A resize handled at present time invalidates the swapchain
        // render pass just like a stale acquire does
        if renderer.end_frame()? == FrameStatus::SwapchainStale {
            render_pass.rebuild_for_swapchain(renderer.swapchain(), None)?;
        }
    }

    renderer.wait_idle()?;
    Ok(())
}
