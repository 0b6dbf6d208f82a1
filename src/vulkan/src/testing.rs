//! Fixtures shared by the scenario binaries. Every object created here is
//! adopted by the environment, so a failing scenario never leaks it.
use std::ffi::CStr;

use anyhow::Context;
use ash::vk;
use scenario::ScenarioError;

use crate::*;

const TARGET_FORMAT: vk::Format = vk::Format::R8G8B8A8_UNORM;
const TARGET_EXTENT: vk::Extent2D = vk::Extent2D { width: 16, height: 16 };

/// Color formats tried when looking for one that lacks a sampling
/// feature, roughly from most to least common.
pub const SAMPLED_FORMATS: &[vk::Format] = &[
    vk::Format::R8_UNORM,
    vk::Format::R8_SNORM,
    vk::Format::R8_SRGB,
    vk::Format::R8G8_UNORM,
    vk::Format::R8G8_SNORM,
    vk::Format::R8G8_SRGB,
    vk::Format::R8G8B8_UNORM,
    vk::Format::R8G8B8_SNORM,
    vk::Format::R8G8B8_SRGB,
    vk::Format::R8G8B8A8_UNORM,
    vk::Format::R8G8B8A8_SNORM,
    vk::Format::R8G8B8A8_SRGB,
    vk::Format::B8G8R8A8_UNORM,
    vk::Format::B8G8R8A8_SNORM,
    vk::Format::B8G8R8A8_SRGB,
    vk::Format::R16_UNORM,
    vk::Format::R16_SNORM,
    vk::Format::R16_SFLOAT,
    vk::Format::R16G16_UNORM,
    vk::Format::R16G16_SNORM,
    vk::Format::R16G16_SFLOAT,
    vk::Format::R16G16B16_UNORM,
    vk::Format::R16G16B16_SNORM,
    vk::Format::R16G16B16_SFLOAT,
    vk::Format::R16G16B16A16_UNORM,
    vk::Format::R16G16B16A16_SNORM,
    vk::Format::R16G16B16A16_SFLOAT,
    vk::Format::R32_SFLOAT,
    vk::Format::R32G32_SFLOAT,
    vk::Format::R32G32B32_SFLOAT,
    vk::Format::R32G32B32A32_SFLOAT,
    vk::Format::R64_SFLOAT,
    vk::Format::R64G64_SFLOAT,
    vk::Format::R64G64B64_SFLOAT,
    vk::Format::R64G64B64A64_SFLOAT,
    vk::Format::R8_SINT,
    vk::Format::R8G8_SINT,
    vk::Format::R8G8B8_SINT,
    vk::Format::R8G8B8A8_SINT,
    vk::Format::B8G8R8A8_SINT,
    vk::Format::R16_SINT,
    vk::Format::R16G16_SINT,
    vk::Format::R16G16B16_SINT,
    vk::Format::R16G16B16A16_SINT,
    vk::Format::R32_SINT,
    vk::Format::R32G32_SINT,
    vk::Format::R32G32B32_SINT,
    vk::Format::R32G32B32A32_SINT,
    vk::Format::R64_SINT,
    vk::Format::R64G64_SINT,
    vk::Format::R64G64B64_SINT,
    vk::Format::R64G64B64A64_SINT,
    vk::Format::R8_UINT,
    vk::Format::R8G8_UINT,
    vk::Format::R8G8B8_UINT,
    vk::Format::R8G8B8A8_UINT,
    vk::Format::B8G8R8A8_UINT,
    vk::Format::R16_UINT,
    vk::Format::R16G16_UINT,
    vk::Format::R16G16B16_UINT,
    vk::Format::R16G16B16A16_UINT,
    vk::Format::R32_UINT,
    vk::Format::R32G32_UINT,
    vk::Format::R32G32B32_UINT,
    vk::Format::R32G32B32A32_UINT,
    vk::Format::R64_UINT,
    vk::Format::R64G64_UINT,
    vk::Format::R64G64B64_UINT,
    vk::Format::R64G64B64A64_UINT,
];

/// Picks the first candidate that can be sampled with some tiling but
/// lacks `missing` there. Linear tiling is checked before optimal.
pub fn find_format_lacking(
    env: &VulkanEnvironment,
    candidates: &[vk::Format],
    missing: vk::FormatFeatureFlags,
) -> Option<(vk::Format, vk::ImageTiling)> {
    let usable = |features: vk::FormatFeatureFlags| {
        features.contains(vk::FormatFeatureFlags::SAMPLED_IMAGE)
            && !features.intersects(missing)
    };
    candidates.iter().find_map(|&format| {
        let props = env.format_properties(format);
        if usable(props.linear_tiling_features) {
            Some((format, vk::ImageTiling::LINEAR))
        } else if usable(props.optimal_tiling_features) {
            Some((format, vk::ImageTiling::OPTIMAL))
        } else {
            None
        }
    })
}

unsafe fn create_image(
    env: &mut VulkanEnvironment,
    format: vk::Format,
    tiling: vk::ImageTiling,
    extent: vk::Extent2D,
    usage: vk::ImageUsageFlags,
) -> Result<vk::ImageView, ScenarioError> {
    let info = vk::ImageCreateInfo::builder()
        .image_type(vk::ImageType::TYPE_2D)
        .format(format)
        .extent(vk::Extent3D {
            width: extent.width,
            height: extent.height,
            depth: 1,
        })
        .mip_levels(1)
        .array_layers(1)
        .samples(vk::SampleCountFlags::TYPE_1)
        .tiling(tiling)
        .usage(usage)
        .sharing_mode(vk::SharingMode::EXCLUSIVE)
        .initial_layout(vk::ImageLayout::UNDEFINED);
    let image = env.device().create_image(&info, None)
        .with_context(|| format!("failed to create {:?} image", format))?;
    let image = env.adopt(image);

    let reqs = env.device().get_image_memory_requirements(image);
    let memory_type = env.physical_device()
        .find_memory_type(reqs.memory_type_bits, Default::default())
        .context("no memory type for image")?;
    let alloc_info = vk::MemoryAllocateInfo::builder()
        .allocation_size(reqs.size)
        .memory_type_index(memory_type);
    let memory = env.device().allocate_memory(&alloc_info, None)
        .context("failed to allocate image memory")?;
    let memory = env.adopt(memory);
    env.device().bind_image_memory(image, memory, 0)
        .context("failed to bind image memory")?;

    let view_info = vk::ImageViewCreateInfo::builder()
        .image(image)
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(format)
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        });
    let view = env.device().create_image_view(&view_info, None)
        .context("failed to create image view")?;
    Ok(env.adopt(view))
}

unsafe fn create_render_pass(env: &mut VulkanEnvironment) ->
    Result<vk::RenderPass, ScenarioError>
{
    let attachments = [vk::AttachmentDescription::builder()
        .format(TARGET_FORMAT)
        .samples(vk::SampleCountFlags::TYPE_1)
        .load_op(vk::AttachmentLoadOp::DONT_CARE)
        .store_op(vk::AttachmentStoreOp::STORE)
        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .final_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
        .build()];
    let color_refs = [vk::AttachmentReference {
        attachment: 0,
        layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
    }];
    let subpasses = [vk::SubpassDescription::builder()
        .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
        .color_attachments(&color_refs)
        .build()];
    let info = vk::RenderPassCreateInfo::builder()
        .attachments(&attachments)
        .subpasses(&subpasses);
    let render_pass = env.device().create_render_pass(&info, None)
        .context("failed to create render pass")?;
    Ok(env.adopt(render_pass))
}

unsafe fn create_shader(env: &mut VulkanEnvironment, code: &[u32]) ->
    Result<vk::ShaderModule, ScenarioError>
{
    let info = vk::ShaderModuleCreateInfo::builder().code(code);
    let module = env.device().create_shader_module(&info, None)
        .context("failed to create shader module")?;
    Ok(env.adopt(module))
}

unsafe fn create_pipeline(
    env: &mut VulkanEnvironment,
    layout: vk::PipelineLayout,
    render_pass: vk::RenderPass,
    sampled: SampledType,
) -> Result<vk::Pipeline, ScenarioError> {
    let vert = create_shader(env, &constant_vertex_shader()?)?;
    let frag = create_shader(env, &sampling_fragment_shader(sampled)?)?;
    let entry = CStr::from_bytes_with_nul(b"main\0").context("entry name")?;
    let stages = [
        vk::PipelineShaderStageCreateInfo::builder()
            .stage(vk::ShaderStageFlags::VERTEX)
            .module(vert)
            .name(entry)
            .build(),
        vk::PipelineShaderStageCreateInfo::builder()
            .stage(vk::ShaderStageFlags::FRAGMENT)
            .module(frag)
            .name(entry)
            .build(),
    ];

    let vertex_input = vk::PipelineVertexInputStateCreateInfo::default();
    let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::builder()
        .topology(vk::PrimitiveTopology::TRIANGLE_LIST);
    let viewport = vk::PipelineViewportStateCreateInfo::builder()
        .viewport_count(1)
        .scissor_count(1);
    let rasterization = vk::PipelineRasterizationStateCreateInfo::builder()
        .polygon_mode(vk::PolygonMode::FILL)
        .cull_mode(vk::CullModeFlags::NONE)
        .front_face(vk::FrontFace::COUNTER_CLOCKWISE)
        .line_width(1.0);
    let multisample = vk::PipelineMultisampleStateCreateInfo::builder()
        .rasterization_samples(vk::SampleCountFlags::TYPE_1);
    let blend_attachments = [vk::PipelineColorBlendAttachmentState {
        color_write_mask: vk::ColorComponentFlags::R
            | vk::ColorComponentFlags::G
            | vk::ColorComponentFlags::B
            | vk::ColorComponentFlags::A,
        ..Default::default()
    }];
    let blend = vk::PipelineColorBlendStateCreateInfo::builder()
        .attachments(&blend_attachments);
    let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
    let dynamic = vk::PipelineDynamicStateCreateInfo::builder()
        .dynamic_states(&dynamic_states);

    let info = vk::GraphicsPipelineCreateInfo::builder()
        .stages(&stages)
        .vertex_input_state(&vertex_input)
        .input_assembly_state(&input_assembly)
        .viewport_state(&viewport)
        .rasterization_state(&rasterization)
        .multisample_state(&multisample)
        .color_blend_state(&blend)
        .dynamic_state(&dynamic)
        .layout(layout)
        .render_pass(render_pass)
        .subpass(0)
        .build();
    let pipelines = env.device()
        .create_graphics_pipelines(vk::PipelineCache::null(), &[info], None)
        .map_err(|(_, e)| e)
        .context("failed to create graphics pipeline")?;
    let pipeline = pipelines.into_iter().next()
        .context("no pipeline returned")?;
    Ok(env.adopt(pipeline))
}

/// A command buffer recorded up to a draw that samples one image
/// through one sampler at set 0, binding 0. The draw is left to the
/// scenario so that it can be the operation under test.
#[derive(Debug)]
pub struct SampledDraw {
    pub sampler: vk::Sampler,
    pub command_buffer: vk::CommandBuffer,
}

impl SampledDraw {
    /// Creates a `format` image of `tiling` to sample, a render target,
    /// and a pipeline, then records the render pass up to the draw.
    /// `sampler_info` may chain extension structs.
    pub unsafe fn begin(
        env: &mut VulkanEnvironment,
        format: vk::Format,
        tiling: vk::ImageTiling,
        sampler_info: &vk::SamplerCreateInfo,
    ) -> Result<Self, ScenarioError> {
        if !env.queue_flags().contains(vk::QueueFlags::GRAPHICS) {
            return Err(ScenarioError::unsupported("no graphics queue"));
        }

        let sampler = env.device().create_sampler(sampler_info, None)
            .context("failed to create sampler")?;
        let sampler = env.adopt(sampler);
        let sampled_view = create_image(
            env, format, tiling, vk::Extent2D { width: 32, height: 32 },
            vk::ImageUsageFlags::SAMPLED,
        )?;
        let target_view = create_image(
            env, TARGET_FORMAT, vk::ImageTiling::OPTIMAL, TARGET_EXTENT,
            vk::ImageUsageFlags::COLOR_ATTACHMENT,
        )?;
        let render_pass = create_render_pass(env)?;
        let attachments = [target_view];
        let fb_info = vk::FramebufferCreateInfo::builder()
            .render_pass(render_pass)
            .attachments(&attachments)
            .width(TARGET_EXTENT.width)
            .height(TARGET_EXTENT.height)
            .layers(1);
        let framebuffer = env.device().create_framebuffer(&fb_info, None)
            .context("failed to create framebuffer")?;
        let framebuffer = env.adopt(framebuffer);

        let bindings = [vk::DescriptorSetLayoutBinding::builder()
            .binding(0)
            .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
            .descriptor_count(1)
            .stage_flags(vk::ShaderStageFlags::FRAGMENT)
            .build()];
        let layout_info = vk::DescriptorSetLayoutCreateInfo::builder()
            .bindings(&bindings);
        let set_layout = env.device()
            .create_descriptor_set_layout(&layout_info, None)
            .context("failed to create set layout")?;
        let set_layout = env.adopt(set_layout);
        let set_layouts = [set_layout];
        let pipeline_layout_info = vk::PipelineLayoutCreateInfo::builder()
            .set_layouts(&set_layouts);
        let pipeline_layout = env.device()
            .create_pipeline_layout(&pipeline_layout_info, None)
            .context("failed to create pipeline layout")?;
        let pipeline_layout = env.adopt(pipeline_layout);

        let pool_sizes = [vk::DescriptorPoolSize {
            ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            descriptor_count: 1,
        }];
        let pool_info = vk::DescriptorPoolCreateInfo::builder()
            .max_sets(1)
            .pool_sizes(&pool_sizes);
        let pool = env.device().create_descriptor_pool(&pool_info, None)
            .context("failed to create descriptor pool")?;
        let pool = env.adopt(pool);
        let alloc_info = vk::DescriptorSetAllocateInfo::builder()
            .descriptor_pool(pool)
            .set_layouts(&set_layouts);
        let set = env.device().allocate_descriptor_sets(&alloc_info)
            .context("failed to allocate descriptor set")?[0];
        let image_infos = [vk::DescriptorImageInfo {
            sampler,
            image_view: sampled_view,
            image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        }];
        let writes = [vk::WriteDescriptorSet::builder()
            .dst_set(set)
            .dst_binding(0)
            .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
            .image_info(&image_infos)
            .build()];
        env.device().update_descriptor_sets(&writes, &[]);

        let pipeline = create_pipeline(
            env, pipeline_layout, render_pass, SampledType::of(format))?;

        let pool_info = vk::CommandPoolCreateInfo::builder()
            .queue_family_index(env.queue_family());
        let command_pool = env.device().create_command_pool(&pool_info, None)
            .context("failed to create command pool")?;
        let command_pool = env.adopt(command_pool);
        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        let command_buffer = env.device()
            .allocate_command_buffers(&alloc_info)
            .context("failed to allocate command buffer")?[0];

        let device = env.device();
        device.begin_command_buffer(
            command_buffer, &vk::CommandBufferBeginInfo::default())
            .context("failed to begin command buffer")?;
        let render_area = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent: TARGET_EXTENT,
        };
        let begin_info = vk::RenderPassBeginInfo::builder()
            .render_pass(render_pass)
            .framebuffer(framebuffer)
            .render_area(render_area);
        device.cmd_begin_render_pass(
            command_buffer, &begin_info, vk::SubpassContents::INLINE);
        device.cmd_bind_pipeline(
            command_buffer, vk::PipelineBindPoint::GRAPHICS, pipeline);
        let viewport = vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: TARGET_EXTENT.width as f32,
            height: TARGET_EXTENT.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        };
        device.cmd_set_viewport(command_buffer, 0, &[viewport]);
        device.cmd_set_scissor(command_buffer, 0, &[render_area]);
        device.cmd_bind_descriptor_sets(
            command_buffer,
            vk::PipelineBindPoint::GRAPHICS,
            pipeline_layout,
            0,
            &[set],
            &[],
        );

        Ok(SampledDraw { sampler, command_buffer })
    }

    pub unsafe fn draw(&self, env: &VulkanEnvironment) {
        env.device().cmd_draw(self.command_buffer, 3, 1, 0, 0);
    }

    /// Closes the render pass and the command buffer. Nothing is
    /// submitted.
    pub unsafe fn end(&self, env: &VulkanEnvironment) ->
        Result<(), ScenarioError>
    {
        env.device().cmd_end_render_pass(self.command_buffer);
        env.device().end_command_buffer(self.command_buffer)
            .context("failed to end command buffer")?;
        Ok(())
    }
}
