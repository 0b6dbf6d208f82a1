//! Sparse resource rules, including binds whose diagnostics arrive with
//! a deferred queue submission.

use anyhow::Context;
use ash::vk;
use log::warn;
use monitor::Severity;
use scenario::{
    Negotiation, Ready, Requirements, Scenario, ScenarioError,
};
use vigil_vulkan::VulkanEnvironment;

macro_rules! test_type {
    () => { scenario::ScenarioTest }
}

const BIND_MEMORY_TYPE: &str = "VUID-VkSparseMemoryBind-memory-01097";

fn buffer_info(flags: vk::BufferCreateFlags) -> vk::BufferCreateInfo {
    vk::BufferCreateInfo::builder()
        .flags(flags)
        .size(2048)
        .usage(vk::BufferUsageFlags::TRANSFER_SRC)
        .sharing_mode(vk::SharingMode::EXCLUSIVE)
        .build()
}

fn image_info(flags: vk::ImageCreateFlags, ty: vk::ImageType) ->
    vk::ImageCreateInfo
{
    let (height, depth) = match ty {
        vk::ImageType::TYPE_1D => (1, 1),
        vk::ImageType::TYPE_3D => (64, 8),
        _ => (64, 1),
    };
    let extent = vk::Extent3D { width: 512, height, depth };
    vk::ImageCreateInfo::builder()
        .flags(flags)
        .image_type(ty)
        .format(vk::Format::R8G8B8A8_UNORM)
        .extent(extent)
        .mip_levels(1)
        .array_layers(1)
        .samples(vk::SampleCountFlags::TYPE_1)
        .tiling(vk::ImageTiling::OPTIMAL)
        .usage(vk::ImageUsageFlags::TRANSFER_SRC)
        .sharing_mode(vk::SharingMode::EXCLUSIVE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .build()
}

fn create_buffer(env: &mut VulkanEnvironment, info: &vk::BufferCreateInfo) {
    unsafe {
        if let Ok(buffer) = env.device().create_buffer(info, None) {
            env.device().destroy_buffer(buffer, None);
        }
    }
}

fn create_image(env: &mut VulkanEnvironment, info: &vk::ImageCreateInfo) {
    unsafe {
        if let Ok(image) = env.device().create_image(info, None) {
            env.device().destroy_image(image, None);
        }
    }
}

fn sparse_buffer_flags_without_binding() -> Result<(), ScenarioError> {
    let s = Scenario::new("sparse_buffer_flags_without_binding")?
        .negotiate::<VulkanEnvironment>(&Negotiation::new())?
        .require(&Requirements::new().feature("sparseResidencyBuffer"))?;
    let info = buffer_info(vk::BufferCreateFlags::SPARSE_RESIDENCY);
    let mut s = s.check(
        Severity::Error,
        "VUID-VkBufferCreateInfo-flags-00918",
        |env| create_buffer(env, &info),
    )?;

    if s.capabilities().has_feature("sparseResidencyAliased") {
        let info = buffer_info(vk::BufferCreateFlags::SPARSE_ALIASED);
        s = s.check(
            Severity::Error,
            "VUID-VkBufferCreateInfo-flags-00918",
            |env| create_buffer(env, &info),
        )?;
    }
    s.finish()
}

fn sparse_image_flags_without_binding() -> Result<(), ScenarioError> {
    let s = Scenario::new("sparse_image_flags_without_binding")?
        .negotiate::<VulkanEnvironment>(&Negotiation::new())?
        .require(&Requirements::new().feature("sparseResidencyImage2D"))?;
    let info = image_info(
        vk::ImageCreateFlags::SPARSE_RESIDENCY, vk::ImageType::TYPE_2D);
    let mut s = s.check(
        Severity::Error,
        "VUID-VkImageCreateInfo-flags-00987",
        |env| create_image(env, &info),
    )?;

    if s.capabilities().has_feature("sparseResidencyAliased") {
        let info = image_info(
            vk::ImageCreateFlags::SPARSE_ALIASED, vk::ImageType::TYPE_2D);
        s = s.check(
            Severity::Error,
            "VUID-VkImageCreateInfo-flags-00987",
            |env| create_image(env, &info),
        )?;
    }
    s.finish()
}

fn residency_unsupported_image_types() -> Result<(), ScenarioError> {
    let negotiation = Negotiation::new()
        .disable_feature("sparseResidencyImage2D")
        .disable_feature("sparseResidencyImage3D");
    let s = Scenario::new("residency_unsupported_image_types")?
        .negotiate::<VulkanEnvironment>(&negotiation)?
        .require(&Requirements::new().feature("sparseBinding"))?;
    let flags = vk::ImageCreateFlags::SPARSE_RESIDENCY
        | vk::ImageCreateFlags::SPARSE_BINDING;

    // Never allowed for 1D images
    let info = image_info(flags, vk::ImageType::TYPE_1D);
    let s = s.check(
        Severity::Error,
        "VUID-VkImageCreateInfo-imageType-00970",
        |env| create_image(env, &info),
    )?;

    let info = image_info(flags, vk::ImageType::TYPE_2D);
    let s = s.check(
        Severity::Error,
        "VUID-VkImageCreateInfo-imageType-00971",
        |env| create_image(env, &info),
    )?;

    let info = image_info(flags, vk::ImageType::TYPE_3D);
    s.check(
        Severity::Error,
        "VUID-VkImageCreateInfo-imageType-00972",
        |env| create_image(env, &info),
    )?.finish()
}

/// Submits one bind on the environment's queue. Invalid binds are
/// skipped by the layer, so a failure here is only logged.
unsafe fn queue_bind(env: &VulkanEnvironment, info: vk::BindSparseInfo) {
    let res = env.device()
        .queue_bind_sparse(env.queue(), &[info], vk::Fence::null());
    if let Err(e) = res {
        warn!("vkQueueBindSparse: {}", e);
    }
}

unsafe fn bind_image(
    env: &VulkanEnvironment,
    image: vk::Image,
    bind: vk::SparseImageMemoryBind,
) {
    let binds = [bind];
    let infos = [vk::SparseImageMemoryBindInfo::builder()
        .image(image)
        .binds(&binds)
        .build()];
    queue_bind(env, vk::BindSparseInfo::builder().image_binds(&infos).build());
}

fn require_sparse_queue(s: &Scenario<Ready<VulkanEnvironment>>) ->
    Result<(), ScenarioError>
{
    if !s.env().queue_flags().contains(vk::QueueFlags::SPARSE_BINDING) {
        return Err(ScenarioError::unsupported("no sparse binding queue"));
    }
    Ok(())
}

fn keep_image(env: &mut VulkanEnvironment, info: &vk::ImageCreateInfo) ->
    Result<vk::Image, ScenarioError>
{
    let image = unsafe { env.device().create_image(info, None) }
        .context("failed to create sparse image")?;
    Ok(env.adopt(image))
}

fn allocate(env: &mut VulkanEnvironment, size: vk::DeviceSize, memory_type: u32)
    -> Result<vk::DeviceMemory, ScenarioError>
{
    let info = vk::MemoryAllocateInfo::builder()
        .allocation_size(size)
        .memory_type_index(memory_type);
    let memory = unsafe { env.device().allocate_memory(&info, None) }
        .with_context(|| format!(
            "failed to allocate {} bytes of memory type {}", size, memory_type))?;
    Ok(env.adopt(memory))
}

fn residency_unsupported_samples() -> Result<(), ScenarioError> {
    let negotiation = Negotiation::new()
        .disable_feature("sparseResidency2Samples")
        .disable_feature("sparseResidency4Samples")
        .disable_feature("sparseResidency8Samples")
        .disable_feature("sparseResidency16Samples");
    let s = Scenario::new("residency_unsupported_samples")?
        .negotiate::<VulkanEnvironment>(&negotiation)?
        .require(&Requirements::new().feature("sparseResidencyImage2D"))?;
    let base = vk::ImageCreateInfo {
        extent: vk::Extent3D { width: 64, height: 64, depth: 1 },
        initial_layout: vk::ImageLayout::PREINITIALIZED,
        ..image_info(
            vk::ImageCreateFlags::SPARSE_RESIDENCY
                | vk::ImageCreateFlags::SPARSE_BINDING,
            vk::ImageType::TYPE_2D,
        )
    };

    let info = vk::ImageCreateInfo { tiling: vk::ImageTiling::LINEAR, ..base };
    let mut s = s.check(
        Severity::Error,
        "VUID-VkImageCreateInfo-tiling-04121",
        |env| create_image(env, &info),
    )?;

    for &(samples, vuid) in [
        (vk::SampleCountFlags::TYPE_2, "VUID-VkImageCreateInfo-imageType-00973"),
        (vk::SampleCountFlags::TYPE_4, "VUID-VkImageCreateInfo-imageType-00974"),
        (vk::SampleCountFlags::TYPE_8, "VUID-VkImageCreateInfo-imageType-00975"),
        (vk::SampleCountFlags::TYPE_16, "VUID-VkImageCreateInfo-imageType-00976"),
    ].iter() {
        let info = vk::ImageCreateInfo { samples, ..base };
        // Transfer-only usage may not be multisampled at all
        s = s.expect_error(vuid)
            .allow(Severity::Error, "VUID-VkImageCreateInfo-samples-02258")
            .perform(|env| create_image(env, &info))
            .verify()?;
    }
    s.finish()
}

fn transient_usage_with_sparse_binding() -> Result<(), ScenarioError> {
    let s = Scenario::new("transient_usage_with_sparse_binding")?
        .negotiate::<VulkanEnvironment>(&Negotiation::new())?
        .require(&Requirements::new().feature("sparseBinding"))?;
    let info = vk::ImageCreateInfo {
        extent: vk::Extent3D { width: 32, height: 32, depth: 1 },
        usage: vk::ImageUsageFlags::TRANSIENT_ATTACHMENT
            | vk::ImageUsageFlags::COLOR_ATTACHMENT,
        ..image_info(vk::ImageCreateFlags::SPARSE_BINDING, vk::ImageType::TYPE_2D)
    };
    s.check(
        Severity::Error,
        "VUID-VkImageCreateInfo-None-01925",
        |env| create_image(env, &info),
    )?.finish()
}

fn image_bind_without_residency() -> Result<(), ScenarioError> {
    let mut s = Scenario::new("image_bind_without_residency")?
        .negotiate::<VulkanEnvironment>(&Negotiation::new())?
        .require(&Requirements::new()
            .feature("sparseBinding")
            .feature("sparseResidencyImage2D"))?;
    require_sparse_queue(&s)?;
    let info = vk::ImageCreateInfo {
        initial_layout: vk::ImageLayout::PREINITIALIZED,
        ..image_info(vk::ImageCreateFlags::SPARSE_BINDING, vk::ImageType::TYPE_2D)
    };
    let image = keep_image(s.env_mut(), &info)?;

    let mut bind = vk::SparseImageMemoryBind::default();
    bind.subresource.aspect_mask = vk::ImageAspectFlags::COLOR;
    s.check(
        Severity::Error,
        "VUID-VkSparseImageMemoryBindInfo-image-02901",
        |env| unsafe { bind_image(env, image, bind) },
    )?.finish()
}

fn bind_offset_past_memory() -> Result<(), ScenarioError> {
    let mut s = Scenario::new("bind_offset_past_memory")?
        .negotiate::<VulkanEnvironment>(&Negotiation::new())?
        .require(&Requirements::new()
            .feature("sparseBinding")
            .feature("sparseResidencyBuffer")
            .feature("sparseResidencyImage2D"))?;
    require_sparse_queue(&s)?;

    let buffer_info = vk::BufferCreateInfo {
        size: 1024,
        ..buffer_info(vk::BufferCreateFlags::SPARSE_RESIDENCY
            | vk::BufferCreateFlags::SPARSE_BINDING)
    };
    let buffer = unsafe { s.env().device().create_buffer(&buffer_info, None) }
        .context("failed to create sparse buffer")?;
    let buffer = s.env_mut().adopt(buffer);
    let image_info = vk::ImageCreateInfo {
        extent: vk::Extent3D { width: 64, height: 64, depth: 1 },
        ..image_info(
            vk::ImageCreateFlags::SPARSE_RESIDENCY
                | vk::ImageCreateFlags::SPARSE_BINDING,
            vk::ImageType::TYPE_2D,
        )
    };
    let image = keep_image(s.env_mut(), &image_info)?;

    let (buffer_bits, image_bits) = unsafe {
        let device = s.env().device();
        (device.get_buffer_memory_requirements(buffer).memory_type_bits,
         device.get_image_memory_requirements(image).memory_type_bits)
    };
    let memory_type = s.env().physical_device()
        .find_memory_type(buffer_bits & image_bits, vk::MemoryPropertyFlags::empty())
        .ok_or_else(|| ScenarioError::unsupported(
            "no memory type shared by sparse buffers and images"))?;
    let memory = allocate(s.env_mut(), 1024, memory_type)?;

    // Every offset lies past the end of the allocation
    let memory_bind = vk::SparseMemoryBind::builder()
        .size(1024)
        .memory(memory)
        .memory_offset(2048)
        .build();
    let mut image_bind = vk::SparseImageMemoryBind::builder()
        .memory(memory)
        .memory_offset(4096)
        .build();
    image_bind.subresource.aspect_mask = vk::ImageAspectFlags::COLOR;
    let memory_binds = [memory_bind];
    let image_binds = [image_bind];
    let buffer_infos = [vk::SparseBufferMemoryBindInfo::builder()
        .buffer(buffer)
        .binds(&memory_binds)
        .build()];
    let opaque_infos = [vk::SparseImageOpaqueMemoryBindInfo::builder()
        .image(image)
        .binds(&memory_binds)
        .build()];
    let image_infos = [vk::SparseImageMemoryBindInfo::builder()
        .image(image)
        .binds(&image_binds)
        .build()];
    let info = vk::BindSparseInfo::builder()
        .buffer_binds(&buffer_infos)
        .image_opaque_binds(&opaque_infos)
        .image_binds(&image_infos)
        .build();

    const OFFSET: &str = "VUID-VkSparseMemoryBind-memoryOffset-01101";
    s.expect_error(OFFSET)
        .expect_error(OFFSET)
        .expect_error(OFFSET)
        .perform(|env| unsafe { queue_bind(env, info) })
        .verify()?
        .finish()
}

fn image_bind_granularity() -> Result<(), ScenarioError> {
    let mut s = Scenario::new("image_bind_granularity")?
        .negotiate::<VulkanEnvironment>(&Negotiation::new())?
        .require(&Requirements::new()
            .feature("sparseBinding")
            .feature("sparseResidencyImage3D"))?;
    require_sparse_queue(&s)?;

    let info = vk::ImageCreateInfo {
        format: vk::Format::B8G8R8A8_UNORM,
        extent: vk::Extent3D { width: 1024, height: 1024, depth: 1 },
        usage: vk::ImageUsageFlags::SAMPLED,
        ..image_info(
            vk::ImageCreateFlags::SPARSE_BINDING
                | vk::ImageCreateFlags::SPARSE_RESIDENCY,
            vk::ImageType::TYPE_3D,
        )
    };
    let image = keep_image(s.env_mut(), &info)?;
    let (requirements, sparse) = unsafe {
        let device = s.env().device();
        (device.get_image_memory_requirements(image),
         device.get_image_sparse_memory_requirements(image))
    };
    let granularity = match sparse.first() {
        Some(req) => req.format_properties.image_granularity,
        None => return Err(ScenarioError::unsupported(
            "no sparse requirements for B8G8R8A8_UNORM")),
    };
    // A granularity of one leaves no misaligned value to try
    if granularity.width <= 1 || granularity.height <= 1
        || granularity.depth <= 1
    {
        return Err(ScenarioError::unsupported(format!(
            "sparse granularity {:?} is too fine", granularity)));
    }
    let memory_type = s.env().physical_device()
        .find_memory_type(
            requirements.memory_type_bits,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )
        .ok_or_else(|| ScenarioError::unsupported(
            "no device local memory for sparse image"))?;
    let memory = allocate(s.env_mut(), requirements.size, memory_type)?;

    let mut bind = vk::SparseImageMemoryBind::builder()
        .memory(memory)
        .extent(granularity)
        .build();
    bind.subresource.aspect_mask = vk::ImageAspectFlags::COLOR;
    let check = |s: Scenario<Ready<VulkanEnvironment>>,
                 bind: vk::SparseImageMemoryBind,
                 vuid: &str|
    {
        s.check(Severity::Error, vuid, |env| unsafe {
            bind_image(env, image, bind)
        })
    };

    // Offsets and extents must be multiples of the granularity
    bind.offset.x = granularity.width as i32 - 1;
    let s = check(s, bind, "VUID-VkSparseImageMemoryBind-offset-01107")?;
    bind.offset.x = 0;
    bind.offset.y = granularity.height as i32 - 1;
    let s = check(s, bind, "VUID-VkSparseImageMemoryBind-offset-01109")?;
    bind.offset.y = 0;
    bind.offset.z = granularity.depth as i32 - 1;
    let s = check(s, bind, "VUID-VkSparseImageMemoryBind-offset-01111")?;
    bind.offset.z = 0;

    bind.extent.width = granularity.width - 1;
    let s = check(s, bind, "VUID-VkSparseImageMemoryBind-extent-01108")?;
    bind.extent.width = 0;
    bind.extent.height = granularity.height - 1;
    let s = check(s, bind, "VUID-VkSparseImageMemoryBind-extent-01110")?;
    bind.extent.height = 0;
    bind.extent.depth = granularity.depth - 1;
    let s = check(s, bind, "VUID-VkSparseImageMemoryBind-extent-01112")?;
    bind.extent.depth = 0;

    // The subresource must exist
    const SUBRESOURCE: &str = "VUID-VkSparseImageMemoryBind-subresource-01106";
    bind.subresource.mip_level = vk::REMAINING_MIP_LEVELS;
    let s = check(s, bind, SUBRESOURCE)?;
    bind.subresource.mip_level = 0;
    bind.subresource.array_layer = vk::REMAINING_ARRAY_LAYERS;
    let s = check(s, bind, SUBRESOURCE)?;
    bind.subresource.array_layer = 0;
    bind.subresource.aspect_mask = vk::ImageAspectFlags::DEPTH;
    check(s, bind, SUBRESOURCE)?.finish()
}

/// A sparse buffer and image, each with lazily allocated memory to bind.
/// Everything belongs to the environment once created.
#[derive(Clone, Copy, Debug)]
struct LazyResources {
    buffer: vk::Buffer,
    buffer_memory: vk::DeviceMemory,
    buffer_size: vk::DeviceSize,
    image: vk::Image,
    image_memory: vk::DeviceMemory,
    image_size: vk::DeviceSize,
}

impl LazyResources {
    fn create(env: &mut VulkanEnvironment, memory_type: u32) ->
        Result<Self, ScenarioError>
    {
        let buffer_info = vk::BufferCreateInfo::builder()
            .flags(vk::BufferCreateFlags::SPARSE_BINDING)
            .size(1024)
            .usage(vk::BufferUsageFlags::STORAGE_BUFFER)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);
        let buffer = unsafe { env.device().create_buffer(&buffer_info, None) }
            .context("failed to create sparse buffer")?;
        let buffer = env.adopt(buffer);
        let image = keep_image(env, &image_info(
            vk::ImageCreateFlags::SPARSE_BINDING,
            vk::ImageType::TYPE_2D,
        ))?;

        let (buffer_size, image_size) = unsafe {
            (env.device().get_buffer_memory_requirements(buffer).size,
             env.device().get_image_memory_requirements(image).size)
        };
        Ok(LazyResources {
            buffer,
            buffer_memory: allocate(env, buffer_size, memory_type)?,
            buffer_size,
            image,
            image_memory: allocate(env, image_size, memory_type)?,
            image_size,
        })
    }

    /// Binds the chosen resources in one submission.
    unsafe fn bind(&self, env: &VulkanEnvironment, buffer: bool, image: bool)
    {
        let buffer_binds = [vk::SparseMemoryBind::builder()
            .size(self.buffer_size)
            .memory(self.buffer_memory)
            .build()];
        let image_binds = [vk::SparseMemoryBind::builder()
            .size(self.image_size)
            .memory(self.image_memory)
            .build()];
        let buffer_infos = [vk::SparseBufferMemoryBindInfo::builder()
            .buffer(self.buffer)
            .binds(&buffer_binds)
            .build()];
        let image_infos = [vk::SparseImageOpaqueMemoryBindInfo::builder()
            .image(self.image)
            .binds(&image_binds)
            .build()];
        let bind_info = vk::BindSparseInfo::builder()
            .buffer_binds(if buffer { &buffer_infos[..] } else { &[] })
            .image_opaque_binds(if image { &image_infos[..] } else { &[] })
            .build();
        queue_bind(env, bind_info);
    }
}

fn lazy_memory_type(s: &Scenario<Ready<VulkanEnvironment>>) ->
    Result<u32, ScenarioError>
{
    s.env().physical_device()
        .find_memory_type(!0, vk::MemoryPropertyFlags::LAZILY_ALLOCATED)
        .ok_or_else(|| ScenarioError::unsupported(
            "no lazily allocated memory type"))
}

fn bind_sparse_lazy_memory() -> Result<(), ScenarioError> {
    let mut s = Scenario::new("bind_sparse_lazy_memory")?
        .negotiate::<VulkanEnvironment>(&Negotiation::new())?
        .require(&Requirements::new()
            .feature("sparseBinding")
            .feature("sparseResidencyBuffer")
            .feature("sparseResidencyImage2D"))?;
    require_sparse_queue(&s)?;
    let memory_type = lazy_memory_type(&s)?;
    let resources = LazyResources::create(s.env_mut(), memory_type)?;

    let s = s.check(Severity::Error, BIND_MEMORY_TYPE, |env| unsafe {
        resources.bind(env, true, false)
    })?;
    let s = s.check(Severity::Error, BIND_MEMORY_TYPE, |env| unsafe {
        resources.bind(env, false, true)
    })?;

    // One report per bind, each consuming its own expectation
    s.expect_error(BIND_MEMORY_TYPE)
        .expect_error(BIND_MEMORY_TYPE)
        .perform(|env| unsafe { resources.bind(env, true, true) })
        .verify()?
        .finish()
}

unit::declare_tests![
    sparse_buffer_flags_without_binding,
    sparse_image_flags_without_binding,
    residency_unsupported_image_types,
    residency_unsupported_samples,
    transient_usage_with_sparse_binding,
    image_bind_without_residency,
    bind_offset_past_memory,
    image_bind_granularity,
    bind_sparse_lazy_memory,
];

fn main() {
    env_logger::init();
    scenario::run_scenarios(__collect_tests)
}
