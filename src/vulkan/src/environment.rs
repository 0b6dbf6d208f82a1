use std::ffi::{CStr, CString};
use std::sync::Arc;

use anyhow::Context;
use ash::vk;
use derivative::Derivative;
use itertools::Itertools;
use log::{info, trace, warn};
use monitor::{Barrier, Dispatcher};
use scenario::{
    ApiVersion, Capabilities, Environment, Negotiation, ScenarioError,
};

use crate::*;

pub const VALIDATION_LAYER: &str = "VK_LAYER_KHRONOS_validation";
const DEBUG_UTILS: &str = "VK_EXT_debug_utils";

/// A Vulkan instance and device with the validation layer enabled and
/// its messages routed into a dispatcher.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct VulkanEnvironment {
    capabilities: Capabilities,
    pdev: PhysicalDevice,
    queue_family: u32,
    queue: vk::Queue,
    barrier: QueueBarrier,
    objects: ObjectList,
    #[derivative(Debug = "ignore")]
    device: ash::Device,
    messenger: DebugMessenger,
    #[derivative(Debug = "ignore")]
    instance: ash::Instance,
    #[derivative(Debug = "ignore")]
    entry: ash::Entry,
    target: MessengerTarget,
}

impl Drop for VulkanEnvironment {
    fn drop(&mut self) {
        trace!("VulkanEnvironment::drop()");
        unsafe {
            if let Err(e) = self.device.device_wait_idle() {
                warn!("device_wait_idle failed: {}", e);
            }
            trace!("releasing {} adopted objects", self.objects.len());
            for object in self.objects.drain() {
                object.destroy(&self.device);
            }
            // Destroyed before the messenger so that the layer can
            // still report leaked objects
            self.device.destroy_device(None);
            self.messenger.destroy();
            self.instance.destroy_instance(None);
        }
    }
}

fn load_entry() -> Result<ash::Entry, ScenarioError> {
    unsafe { ash::Entry::load() }.map_err(|e| {
        ScenarioError::unsupported(format!("Vulkan loader not found: {}", e))
    })
}

fn instance_version(entry: &ash::Entry) -> Result<ApiVersion, ScenarioError> {
    let version = unsafe { entry.try_enumerate_instance_version() }
        .context("failed to query instance version")?
        .unwrap_or(vk::API_VERSION_1_0);
    Ok(version_from_vk(version))
}

fn has_layer(entry: &ash::Entry, name: &str) -> Result<bool, ScenarioError> {
    let layers = unsafe { entry.enumerate_instance_layer_properties() }
        .context("failed to enumerate instance layers")?;
    Ok(layers.iter().any(|layer| cstr_name(&layer.layer_name) == name))
}

fn has_instance_extension(entry: &ash::Entry, name: &str) ->
    Result<bool, ScenarioError>
{
    let exts = unsafe { entry.enumerate_instance_extension_properties(None) }
        .context("failed to enumerate instance extensions")?;
    Ok(exts.iter().any(|ext| cstr_name(&ext.extension_name) == name))
}

unsafe fn create_instance(
    entry: &ash::Entry,
    api_version: ApiVersion,
    target: &MessengerTarget,
) -> Result<ash::Instance, ScenarioError> {
    if !has_layer(entry, VALIDATION_LAYER)? {
        return Err(ScenarioError::unsupported(
            format!("{} is not installed", VALIDATION_LAYER)));
    }
    if !has_instance_extension(entry, DEBUG_UTILS)? {
        return Err(ScenarioError::unsupported(
            format!("{} is not available", DEBUG_UTILS)));
    }

    let app_name = CStr::from_bytes_with_nul(b"vigil\0")
        .context("application name")?;
    let app_info = vk::ApplicationInfo::builder()
        .application_name(app_name)
        .application_version(vk::make_api_version(0, 0, 1, 0))
        .engine_name(app_name)
        .api_version(version_to_vk(api_version));

    let layers = cstrings(&[VALIDATION_LAYER.to_owned()])?;
    let extensions = cstrings(&[DEBUG_UTILS.to_owned()])?;
    let layer_ptrs = layers.iter().map(|s| s.as_ptr()).collect::<Vec<_>>();
    let ext_ptrs = extensions.iter().map(|s| s.as_ptr()).collect::<Vec<_>>();
    info!("enabled layers: {:?}", layers);
    info!("enabled instance extensions: {:?}", extensions);

    // Chained in so that instance creation and destruction are
    // reported as well
    let mut messenger_info = target.create_info();
    let create_info = vk::InstanceCreateInfo::builder()
        .application_info(&app_info)
        .enabled_layer_names(&layer_ptrs)
        .enabled_extension_names(&ext_ptrs)
        .push_next(&mut messenger_info);

    entry.create_instance(&create_info, None)
        .context("failed to create instance")
        .map_err(ScenarioError::Setup)
}

unsafe fn create_device(
    instance: &ash::Instance,
    pdev: &PhysicalDevice,
    caps: &Capabilities,
    queue_family: u32,
) -> Result<ash::Device, ScenarioError> {
    let priorities = [1.0];
    let queue_infos = [vk::DeviceQueueCreateInfo::builder()
        .queue_family_index(queue_family)
        .queue_priorities(&priorities)
        .build()];
    let features = features_from_caps(caps);
    let mut chain = FeatureChain::from_caps(caps);
    let p_next = chain.link(|gate| gate.is_open(
        caps.api_version, &|ext: &str| caps.has_extension(ext)));
    let extensions: Vec<CString> =
        cstrings(caps.extensions.iter().sorted())?;
    let ext_ptrs = extensions.iter().map(|s| s.as_ptr()).collect::<Vec<_>>();
    info!("enabled device extensions: {:?}", extensions);

    let create_info = vk::DeviceCreateInfo {
        p_next,
        ..vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&ext_ptrs)
            .enabled_features(&features)
            .build()
    };
    instance.create_device(pdev.handle, &create_info, None)
        .context("failed to create device")
        .map_err(ScenarioError::Setup)
}

impl VulkanEnvironment {
    pub fn physical_device(&self) -> &PhysicalDevice {
        &self.pdev
    }

    pub fn device(&self) -> &ash::Device {
        &self.device
    }

    pub fn instance(&self) -> &ash::Instance {
        &self.instance
    }

    pub fn queue(&self) -> vk::Queue {
        self.queue
    }

    pub fn queue_family(&self) -> u32 {
        self.queue_family
    }

    pub fn queue_flags(&self) -> vk::QueueFlags {
        self.pdev.queue_families[self.queue_family as usize].queue_flags
    }

    pub fn format_properties(&self, format: vk::Format) -> vk::FormatProperties
    {
        unsafe {
            self.instance
                .get_physical_device_format_properties(self.pdev.handle, format)
        }
    }

    /// Hands `object` to the environment, which destroys it ahead of the
    /// device however the scenario ends. Returns the handle for further
    /// use.
    pub fn adopt<T: DeviceObject + Copy + 'static>(&mut self, object: T) -> T
    {
        self.objects.push(Box::new(object));
        object
    }
}

/// Everything created after the instance. Kept apart so that a failure
/// here can tear the instance down behind it.
unsafe fn bring_up_device(
    instance: &ash::Instance,
    negotiation: &Negotiation,
    api_version: ApiVersion,
) -> Result<(PhysicalDevice, Capabilities, u32, ash::Device), ScenarioError> {
    let pdev = first_physical_device(instance, api_version)?;
    let available = pdev.capabilities(api_version);
    let mut capabilities = negotiation.resolve(&available)?;
    retain_enabled_features(&mut capabilities);
    info!(
        "negotiated Vulkan {} with features [{}]",
        capabilities.api_version,
        capabilities.features.iter().sorted().format(", "),
    );

    let queue_family = pdev.choose_queue_family(&capabilities)
        .ok_or_else(|| ScenarioError::unsupported("no queue family"))?;
    let device = create_device(instance, &pdev, &capabilities, queue_family)?;
    Ok((pdev, capabilities, queue_family, device))
}

impl Environment for VulkanEnvironment {
    fn negotiate(negotiation: &Negotiation, dispatcher: Arc<Dispatcher>) ->
        Result<Self, ScenarioError>
    {
        let entry = load_entry()?;
        let api_version = negotiation.api_version
            .min(instance_version(&entry)?);
        let target = MessengerTarget::new(dispatcher);

        unsafe {
            let instance = create_instance(&entry, api_version, &target)?;
            let mut messenger =
                match DebugMessenger::new(&entry, &instance, &target) {
                    Ok(messenger) => messenger,
                    Err(e) => {
                        instance.destroy_instance(None);
                        let e = anyhow::Error::new(e)
                            .context("failed to create debug messenger");
                        return Err(ScenarioError::Setup(e));
                    },
                };

            let (pdev, capabilities, queue_family, device) =
                match bring_up_device(&instance, negotiation, api_version) {
                    Ok(res) => res,
                    Err(e) => {
                        messenger.destroy();
                        instance.destroy_instance(None);
                        return Err(e);
                    },
                };
            let queue = device.get_device_queue(queue_family, 0);
            let barrier = QueueBarrier::new(device.clone(), queue);

            Ok(VulkanEnvironment {
                capabilities,
                pdev,
                queue_family,
                queue,
                barrier,
                objects: Default::default(),
                device,
                messenger,
                instance,
                entry,
                target,
            })
        }
    }

    fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    fn barrier(&self) -> &dyn Barrier {
        &self.barrier
    }
}
