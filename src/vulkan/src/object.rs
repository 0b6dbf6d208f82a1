use std::fmt;

use ash::vk;

/// A device-level handle that can be handed to the environment, which
/// destroys it before the device goes away.
pub trait DeviceObject: fmt::Debug {
    unsafe fn destroy(self: Box<Self>, device: &ash::Device);
}

macro_rules! impl_device_object {
    ($($ty:ident => $destroy:ident,)*) => {
        $(impl DeviceObject for vk::$ty {
            unsafe fn destroy(self: Box<Self>, device: &ash::Device) {
                device.$destroy(*self, None);
            }
        })*
    }
}

impl_device_object! {
    Buffer => destroy_buffer,
    Image => destroy_image,
    ImageView => destroy_image_view,
    DeviceMemory => free_memory,
    Sampler => destroy_sampler,
    SamplerYcbcrConversion => destroy_sampler_ycbcr_conversion,
    DescriptorSetLayout => destroy_descriptor_set_layout,
    DescriptorPool => destroy_descriptor_pool,
    PipelineLayout => destroy_pipeline_layout,
    Pipeline => destroy_pipeline,
    ShaderModule => destroy_shader_module,
    RenderPass => destroy_render_pass,
    Framebuffer => destroy_framebuffer,
    CommandPool => destroy_command_pool,
}

/// Objects owned on behalf of a scenario, released newest first.
#[derive(Debug, Default)]
pub(crate) struct ObjectList {
    objects: Vec<Box<dyn DeviceObject>>,
}

impl ObjectList {
    pub(crate) fn push(&mut self, object: Box<dyn DeviceObject>) {
        self.objects.push(object);
    }

    pub(crate) fn len(&self) -> usize {
        self.objects.len()
    }

    /// Empties the list in release order.
    pub(crate) fn drain(&mut self) ->
        impl Iterator<Item = Box<dyn DeviceObject>> + '_
    {
        self.objects.drain(..).rev()
    }
}

#[cfg(test)]
mod tests {
    use ash::vk::Handle;

    use super::*;

    fn release_order() {
        let mut list = ObjectList::default();
        list.push(Box::new(vk::Buffer::from_raw(1)));
        list.push(Box::new(vk::DeviceMemory::from_raw(2)));
        list.push(Box::new(vk::Image::from_raw(3)));
        assert_eq!(list.len(), 3);

        let order: Vec<String> =
            list.drain().map(|object| format!("{:?}", object)).collect();
        assert_eq!(order, [
            format!("{:?}", vk::Image::from_raw(3)),
            format!("{:?}", vk::DeviceMemory::from_raw(2)),
            format!("{:?}", vk::Buffer::from_raw(1)),
        ]);
        assert_eq!(list.len(), 0);
    }

    unit::declare_tests![release_order];
}

#[cfg(test)]
unit::collect_tests![tests];
