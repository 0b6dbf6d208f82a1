use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_void};
use std::ptr;

use anyhow::Context;
use ash::vk;
use log::{debug, info};
use scenario::{ApiVersion, Capabilities, ScenarioError};

macro_rules! feature_table {
    ($($field:ident => $name:expr,)*) => {
        /// Names of the core features negotiation knows about.
        pub const FEATURE_NAMES: &[&str] = &[$($name,)*];

        pub(crate) fn features_to_names(features: &vk::PhysicalDeviceFeatures)
            -> Vec<&'static str>
        {
            let mut names = Vec::new();
            $(if features.$field == vk::TRUE { names.push($name); })*
            names
        }

        /// Builds the feature struct passed at device creation.
        pub(crate) fn features_from_caps(caps: &Capabilities) ->
            vk::PhysicalDeviceFeatures
        {
            vk::PhysicalDeviceFeatures {
                $($field: caps.has_feature($name) as vk::Bool32,)*
                ..Default::default()
            }
        }
    }
}

feature_table! {
    sampler_anisotropy => "samplerAnisotropy",
    sparse_binding => "sparseBinding",
    sparse_residency_buffer => "sparseResidencyBuffer",
    sparse_residency_image2_d => "sparseResidencyImage2D",
    sparse_residency_image3_d => "sparseResidencyImage3D",
    sparse_residency2_samples => "sparseResidency2Samples",
    sparse_residency4_samples => "sparseResidency4Samples",
    sparse_residency8_samples => "sparseResidency8Samples",
    sparse_residency16_samples => "sparseResidency16Samples",
    sparse_residency_aliased => "sparseResidencyAliased",
    shader_resource_residency => "shaderResourceResidency",
    image_cube_array => "imageCubeArray",
}

macro_rules! add_to_pnext {
    ($pnext:expr, $struct:expr) => {
        $struct.p_next = $pnext;
        $pnext = &$struct as *const _ as _;
    }
}

pub const CUSTOM_BORDER_COLOR: &str = "VK_EXT_custom_border_color";
pub const NON_SEAMLESS_CUBE_MAP: &str = "VK_EXT_non_seamless_cube_map";

/// When a chained feature struct may be passed: from a core version on,
/// or once its extension is enabled.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Gate {
    Version(ApiVersion),
    Extension(&'static str),
}

impl Gate {
    pub(crate) fn is_open(self, version: ApiVersion, has_ext: &dyn Fn(&str) -> bool)
        -> bool
    {
        match self {
            Gate::Version(required) => version >= required,
            Gate::Extension(name) => has_ext(name),
        }
    }
}

/// Feature structs reached through `pNext`, both when querying and when
/// creating the device.
#[derive(Debug, Default)]
pub(crate) struct FeatureChain {
    ycbcr: vk::PhysicalDeviceSamplerYcbcrConversionFeatures,
    vulkan12: vk::PhysicalDeviceVulkan12Features,
    border_color: vk::PhysicalDeviceCustomBorderColorFeaturesEXT,
    cube_map: vk::PhysicalDeviceNonSeamlessCubeMapFeaturesEXT,
}

macro_rules! chained_feature_table {
    ($($member:ident if $gate:expr => {
        $($field:ident => $name:expr,)*
    })*) => {
        /// Names of the chained features negotiation knows about.
        pub const CHAINED_FEATURE_NAMES: &[&str] = &[$($($name,)*)*];

        impl FeatureChain {
            pub(crate) fn names(&self) -> Vec<&'static str> {
                let mut names = Vec::new();
                $($(if self.$member.$field == vk::TRUE { names.push($name); })*)*
                names
            }

            pub(crate) fn from_caps(caps: &Capabilities) -> Self {
                let mut chain = FeatureChain::default();
                $($(chain.$member.$field = caps.has_feature($name) as vk::Bool32;)*)*
                chain
            }

            /// Links the members whose gate is open. The returned head
            /// points into `self`, which must stay put while it is used.
            pub(crate) fn link(&mut self, open: impl Fn(Gate) -> bool) ->
                *mut c_void
            {
                let mut p_next: *mut c_void = ptr::null_mut();
                $(if open($gate) { add_to_pnext!(p_next, self.$member); })*
                p_next
            }

            pub(crate) fn gate_of(name: &str) -> Option<Gate> {
                $($(if name == $name { return Some($gate); })*)*
                None
            }
        }
    }
}

chained_feature_table! {
    ycbcr if Gate::Version(ApiVersion::new(1, 1, 0)) => {
        sampler_ycbcr_conversion => "samplerYcbcrConversion",
    }
    vulkan12 if Gate::Version(ApiVersion::new(1, 2, 0)) => {
        sampler_mirror_clamp_to_edge => "samplerMirrorClampToEdge",
        sampler_filter_minmax => "samplerFilterMinmax",
    }
    border_color if Gate::Extension(CUSTOM_BORDER_COLOR) => {
        custom_border_colors => "customBorderColors",
        custom_border_color_without_format => "customBorderColorWithoutFormat",
    }
    cube_map if Gate::Extension(NON_SEAMLESS_CUBE_MAP) => {
        non_seamless_cube_map => "nonSeamlessCubeMap",
    }
}

/// Drops chained features whose struct cannot be passed at device
/// creation, e.g. because their extension was not negotiated.
pub(crate) fn retain_enabled_features(caps: &mut Capabilities) {
    let version = caps.api_version;
    let extensions = &caps.extensions;
    caps.features.retain(|name| match FeatureChain::gate_of(name) {
        Some(gate) => gate.is_open(version, &|ext: &str| extensions.contains(ext)),
        None => true,
    });
}

pub(crate) fn version_from_vk(version: u32) -> ApiVersion {
    ApiVersion::new(
        vk::api_version_major(version),
        vk::api_version_minor(version),
        vk::api_version_patch(version),
    )
}

pub(crate) fn version_to_vk(version: ApiVersion) -> u32 {
    let [major, minor, patch] = version.0;
    vk::make_api_version(0, major, minor, patch)
}

pub(crate) fn cstr_name(raw: &[c_char]) -> String {
    unsafe { CStr::from_ptr(raw.as_ptr()) }.to_string_lossy().into_owned()
}

pub(crate) fn cstrings<'a>(names: impl IntoIterator<Item = &'a String>) ->
    Result<Vec<CString>, ScenarioError>
{
    names.into_iter()
        .map(|name| CString::new(name.as_str())
            .with_context(|| format!("invalid name `{}`", name)))
        .collect::<Result<_, _>>()
        .map_err(ScenarioError::Setup)
}

/// A physical device together with everything queried from it.
#[derive(Debug)]
pub struct PhysicalDevice {
    pub(crate) handle: vk::PhysicalDevice,
    pub properties: vk::PhysicalDeviceProperties,
    pub features: vk::PhysicalDeviceFeatures,
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    pub queue_families: Vec<vk::QueueFamilyProperties>,
    pub extensions: Vec<String>,
    /// Features only reported through `vkGetPhysicalDeviceFeatures2`.
    pub chained_features: Vec<&'static str>,
    pub max_custom_border_color_samplers: Option<u32>,
}

impl PhysicalDevice {
    /// Queries `handle`. The `*2` entry points are only used when
    /// `instance_version` and the device both reach 1.1.
    pub(crate) unsafe fn query(
        instance: &ash::Instance,
        handle: vk::PhysicalDevice,
        instance_version: ApiVersion,
    ) -> Result<Self, ScenarioError> {
        let extensions: Vec<String> = instance
            .enumerate_device_extension_properties(handle)
            .context("failed to enumerate device extensions")?
            .iter()
            .map(|ext| cstr_name(&ext.extension_name))
            .collect();
        let properties = instance.get_physical_device_properties(handle);
        let version = version_from_vk(properties.api_version)
            .min(instance_version);
        let has_ext = |name: &str| extensions.iter().any(|ext| ext == name);

        let mut chained_features = Vec::new();
        let mut max_custom_border_color_samplers = None;
        if version >= ApiVersion::new(1, 1, 0) {
            let mut chain = FeatureChain::default();
            let mut features2 = vk::PhysicalDeviceFeatures2 {
                p_next: chain.link(|gate| gate.is_open(version, &has_ext)),
                ..Default::default()
            };
            instance.get_physical_device_features2(handle, &mut features2);
            chained_features = chain.names();

            if has_ext(CUSTOM_BORDER_COLOR) {
                let mut border_color =
                    vk::PhysicalDeviceCustomBorderColorPropertiesEXT::default();
                let mut props2 = vk::PhysicalDeviceProperties2::builder()
                    .push_next(&mut border_color)
                    .build();
                instance.get_physical_device_properties2(handle, &mut props2);
                max_custom_border_color_samplers =
                    Some(border_color.max_custom_border_color_samplers);
            }
        }

        Ok(PhysicalDevice {
            handle,
            properties,
            features: instance.get_physical_device_features(handle),
            memory_properties:
                instance.get_physical_device_memory_properties(handle),
            queue_families:
                instance.get_physical_device_queue_family_properties(handle),
            extensions,
            chained_features,
            max_custom_border_color_samplers,
        })
    }

    pub fn name(&self) -> String {
        cstr_name(&self.properties.device_name)
    }

    pub fn api_version(&self) -> ApiVersion {
        version_from_vk(self.properties.api_version)
    }

    /// Everything the device offers, before negotiation masks any of
    /// it.
    pub fn capabilities(&self, instance_version: ApiVersion) -> Capabilities
    {
        let limits = &self.properties.limits;
        let mut caps = Capabilities::new(
            self.api_version().min(instance_version))
            .with_limit("maxSamplerAnisotropy",
                limits.max_sampler_anisotropy as f64)
            .with_limit("maxSamplerLodBias", limits.max_sampler_lod_bias as f64)
            .with_limit("maxSamplerAllocationCount",
                limits.max_sampler_allocation_count as f64)
            .with_limit("sparseAddressSpaceSize",
                limits.sparse_address_space_size as f64);
        if let Some(count) = self.max_custom_border_color_samplers {
            caps = caps.with_limit("maxCustomBorderColorSamplers", count as f64);
        }
        let chained = self.chained_features.iter().copied();
        for name in features_to_names(&self.features).into_iter().chain(chained)
        {
            caps = caps.with_feature(name);
        }
        for ext in self.extensions.iter() {
            caps = caps.with_extension(ext.clone());
        }
        caps
    }

    /// Picks the queue family scenarios submit to. Sparse binding is
    /// preferred when enabled so that bind scenarios share the queue.
    pub(crate) fn choose_queue_family(&self, caps: &Capabilities) ->
        Option<u32>
    {
        let wanted = if caps.has_feature("sparseBinding") {
            vk::QueueFlags::GRAPHICS | vk::QueueFlags::SPARSE_BINDING
        } else {
            vk::QueueFlags::GRAPHICS
        };
        let find = |flags: vk::QueueFlags| self.queue_families.iter()
            .position(|family| family.queue_flags.contains(flags))
            .map(|idx| idx as u32);
        find(wanted)
            .or_else(|| find(vk::QueueFlags::SPARSE_BINDING))
            .or_else(|| find(vk::QueueFlags::GRAPHICS))
            .or_else(|| (!self.queue_families.is_empty()).then(|| 0))
    }

    /// Index of a memory type allowed by `type_bits` with all of
    /// `flags`.
    pub fn find_memory_type(
        &self,
        type_bits: u32,
        flags: vk::MemoryPropertyFlags,
    ) -> Option<u32> {
        let props = &self.memory_properties;
        (0..props.memory_type_count).find(|&idx| {
            let ty = &props.memory_types[idx as usize];
            type_bits & (1 << idx) != 0 && ty.property_flags.contains(flags)
        })
    }
}

/// Returns the first physical device, or the skip signal if there is
/// none.
pub(crate) unsafe fn first_physical_device(
    instance: &ash::Instance,
    instance_version: ApiVersion,
) -> Result<PhysicalDevice, ScenarioError> {
    let handles = instance.enumerate_physical_devices()
        .context("failed to enumerate physical devices")?;
    let handle = match handles.first() {
        Some(&handle) => handle,
        None => return Err(ScenarioError::unsupported("no Vulkan device")),
    };
    let pdev = PhysicalDevice::query(instance, handle, instance_version)?;
    info!("using device: {} (Vulkan {})", pdev.name(), pdev.api_version());
    debug!("device features: {:?}", features_to_names(&pdev.features));
    debug!("chained features: {:?}", pdev.chained_features);
    Ok(pdev)
}


#[cfg(test)]
unit::collect_tests![tests];
