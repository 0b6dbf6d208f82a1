use std::ffi::{c_void, CStr};
use std::os::raw::c_char;
use std::sync::Arc;

use ash::extensions::ext::DebugUtils;
use ash::vk;
use derivative::Derivative;
use monitor::{
    Diagnostic, Dispatcher, Label, MessageTypes, ObjectInfo, Severity,
};

macro_rules! object_type_names {
    ($($name:ident = $value:ident;)*) => {
        /// Human readable name of a debug object type.
        pub(crate) fn object_type_name(ty: vk::ObjectType) -> &'static str {
            match ty {
                $(vk::ObjectType::$value => stringify!($name),)*
                _ => "unknown type",
            }
        }
    }
}

object_type_names! {
    Instance = INSTANCE;
    PhysicalDevice = PHYSICAL_DEVICE;
    Device = DEVICE;
    Queue = QUEUE;
    Semaphore = SEMAPHORE;
    CommandBuffer = COMMAND_BUFFER;
    Fence = FENCE;
    DeviceMemory = DEVICE_MEMORY;
    Buffer = BUFFER;
    Image = IMAGE;
    Event = EVENT;
    QueryPool = QUERY_POOL;
    BufferView = BUFFER_VIEW;
    ImageView = IMAGE_VIEW;
    ShaderModule = SHADER_MODULE;
    PipelineCache = PIPELINE_CACHE;
    PipelineLayout = PIPELINE_LAYOUT;
    RenderPass = RENDER_PASS;
    Pipeline = PIPELINE;
    DescriptorSetLayout = DESCRIPTOR_SET_LAYOUT;
    Sampler = SAMPLER;
    DescriptorPool = DESCRIPTOR_POOL;
    DescriptorSet = DESCRIPTOR_SET;
    Framebuffer = FRAMEBUFFER;
    CommandPool = COMMAND_POOL;
    SamplerYcbcrConversion = SAMPLER_YCBCR_CONVERSION;
    DescriptorUpdateTemplate = DESCRIPTOR_UPDATE_TEMPLATE;
    DebugUtilsMessengerEXT = DEBUG_UTILS_MESSENGER_EXT;
}

pub(crate) fn severity_from_vk(flags: vk::DebugUtilsMessageSeverityFlagsEXT)
    -> Severity
{
    use vk::DebugUtilsMessageSeverityFlagsEXT as Flags;
    if flags.contains(Flags::ERROR) {
        Severity::Error
    } else if flags.contains(Flags::WARNING) {
        Severity::Warning
    } else if flags.contains(Flags::INFO) {
        Severity::Info
    } else {
        Severity::Verbose
    }
}

pub(crate) fn types_from_vk(flags: vk::DebugUtilsMessageTypeFlagsEXT) ->
    MessageTypes
{
    use vk::DebugUtilsMessageTypeFlagsEXT as Flags;
    let pairs = [
        (Flags::GENERAL, MessageTypes::GENERAL),
        (Flags::VALIDATION, MessageTypes::VALIDATION),
        (Flags::PERFORMANCE, MessageTypes::PERFORMANCE),
    ];
    pairs.iter()
        .filter(|&&(bit, _)| flags.contains(bit))
        .fold(MessageTypes::empty(), |acc, &(_, ty)| acc | ty)
}

unsafe fn string_from_ptr(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        None
    } else {
        Some(CStr::from_ptr(ptr).to_string_lossy().into_owned())
    }
}

unsafe fn slice_from_raw<'a, T>(ptr: *const T, len: u32) -> &'a [T] {
    if ptr.is_null() || len == 0 {
        &[]
    } else {
        std::slice::from_raw_parts(ptr, len as usize)
    }
}

unsafe fn label_from_vk(label: &vk::DebugUtilsLabelEXT) -> Label {
    Label {
        name: string_from_ptr(label.p_label_name).unwrap_or_default(),
        color: label.color,
    }
}

unsafe fn object_from_vk(info: &vk::DebugUtilsObjectNameInfoEXT) ->
    ObjectInfo
{
    ObjectInfo {
        ty: object_type_name(info.object_type).to_owned(),
        handle: info.object_handle,
        name: string_from_ptr(info.p_object_name),
    }
}

/// Copies a callback payload out of layer-owned memory.
///
/// # Safety
///
/// Every pointer in `data` must be null or valid for the advertised
/// length, as the callback contract guarantees.
pub unsafe fn diagnostic_from_vk(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    types: vk::DebugUtilsMessageTypeFlagsEXT,
    data: &vk::DebugUtilsMessengerCallbackDataEXT,
) -> Diagnostic {
    Diagnostic {
        severity: severity_from_vk(severity),
        types: types_from_vk(types),
        id_name: string_from_ptr(data.p_message_id_name).unwrap_or_default(),
        id_number: data.message_id_number,
        message: string_from_ptr(data.p_message).unwrap_or_default(),
        objects: slice_from_raw(data.p_objects, data.object_count)
            .iter().map(|x| object_from_vk(x)).collect(),
        queue_labels: slice_from_raw(data.p_queue_labels, data.queue_label_count)
            .iter().map(|x| label_from_vk(x)).collect(),
        cmd_buf_labels:
            slice_from_raw(data.p_cmd_buf_labels, data.cmd_buf_label_count)
                .iter().map(|x| label_from_vk(x)).collect(),
    }
}

unsafe extern "system" fn debug_message_handler(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    types: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    p_user_data: *mut c_void,
) -> vk::Bool32 {
    if p_callback_data.is_null() || p_user_data.is_null() {
        return vk::FALSE;
    }
    let dispatcher = &*(p_user_data as *const Arc<Dispatcher>);
    let diagnostic = diagnostic_from_vk(severity, types, &*p_callback_data);
    dispatcher.dispatch(diagnostic);
    vk::FALSE
}

/// Owns the callback target. The boxed dispatcher handle must outlive
/// both the messenger and any instance created with `create_info`
/// chained in.
#[derive(Derivative)]
#[derivative(Debug)]
pub(crate) struct MessengerTarget {
    #[derivative(Debug = "ignore")]
    dispatcher: Box<Arc<Dispatcher>>,
}

impl MessengerTarget {
    pub(crate) fn new(dispatcher: Arc<Dispatcher>) -> Self {
        MessengerTarget { dispatcher: Box::new(dispatcher) }
    }

    /// Every severity and the validation and performance message types.
    /// Which severities count is the monitor's business.
    pub(crate) fn create_info(&self) -> vk::DebugUtilsMessengerCreateInfoEXT
    {
        use vk::DebugUtilsMessageSeverityFlagsEXT as Sev;
        use vk::DebugUtilsMessageTypeFlagsEXT as Ty;
        vk::DebugUtilsMessengerCreateInfoEXT::builder()
            .message_severity(Sev::VERBOSE | Sev::INFO | Sev::WARNING
                | Sev::ERROR)
            .message_type(Ty::VALIDATION | Ty::PERFORMANCE)
            .pfn_user_callback(Some(debug_message_handler))
            .user_data(&*self.dispatcher as *const Arc<Dispatcher> as _)
            .build()
    }
}

#[derive(Derivative)]
#[derivative(Debug)]
pub(crate) struct DebugMessenger {
    #[derivative(Debug = "ignore")]
    loader: DebugUtils,
    inner: vk::DebugUtilsMessengerEXT,
}

impl DebugMessenger {
    pub(crate) unsafe fn new(
        entry: &ash::Entry,
        instance: &ash::Instance,
        target: &MessengerTarget,
    ) -> Result<Self, vk::Result> {
        let loader = DebugUtils::new(entry, instance);
        let inner = loader
            .create_debug_utils_messenger(&target.create_info(), None)?;
        Ok(DebugMessenger { loader, inner })
    }

    pub(crate) unsafe fn destroy(&mut self) {
        self.loader.destroy_debug_utils_messenger(self.inner, None);
    }
}

#[cfg(test)]
mod tests {
    use std::ffi::CString;
    use std::ptr;

    use super::*;

    fn converts_severity() {
        use vk::DebugUtilsMessageSeverityFlagsEXT as Flags;
        assert_eq!(severity_from_vk(Flags::ERROR), Severity::Error);
        assert_eq!(severity_from_vk(Flags::WARNING), Severity::Warning);
        assert_eq!(severity_from_vk(Flags::INFO), Severity::Info);
        assert_eq!(severity_from_vk(Flags::VERBOSE), Severity::Verbose);
    }

    fn converts_types() {
        use vk::DebugUtilsMessageTypeFlagsEXT as Flags;
        let types = types_from_vk(Flags::VALIDATION | Flags::PERFORMANCE);
        assert_eq!(types, MessageTypes::VALIDATION | MessageTypes::PERFORMANCE);
        assert_eq!(types_from_vk(Flags::empty()), MessageTypes::empty());
    }

    fn copies_callback_data() {
        let id = CString::new("VUID-VkSamplerCreateInfo-maxLod-01973").unwrap();
        let msg = CString::new("minLod is greater than maxLod").unwrap();
        let obj_name = CString::new("test sampler").unwrap();
        let label_name = CString::new("sampler pass").unwrap();
        let objects = [vk::DebugUtilsObjectNameInfoEXT {
            object_type: vk::ObjectType::SAMPLER,
            object_handle: 0x1234,
            p_object_name: obj_name.as_ptr(),
            ..Default::default()
        }];
        let labels = [vk::DebugUtilsLabelEXT {
            p_label_name: label_name.as_ptr(),
            color: [1.0, 0.0, 0.0, 1.0],
            ..Default::default()
        }];
        let data = vk::DebugUtilsMessengerCallbackDataEXT {
            p_message_id_name: id.as_ptr(),
            message_id_number: 42,
            p_message: msg.as_ptr(),
            queue_label_count: 0,
            p_queue_labels: ptr::null(),
            cmd_buf_label_count: labels.len() as _,
            p_cmd_buf_labels: labels.as_ptr(),
            object_count: objects.len() as _,
            p_objects: objects.as_ptr(),
            ..Default::default()
        };
        let diag = unsafe { diagnostic_from_vk(
            vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION,
            &data,
        ) };
        assert_eq!(diag.severity, Severity::Error);
        assert_eq!(diag.id_name, "VUID-VkSamplerCreateInfo-maxLod-01973");
        assert_eq!(diag.id_number, 42);
        assert_eq!(diag.message, "minLod is greater than maxLod");
        assert_eq!(diag.objects[0].to_string(),
            "Sampler 0x0000000000001234[test sampler]");
        assert_eq!(diag.cmd_buf_labels[0].name, "sampler pass");
        assert!(diag.queue_labels.is_empty());
    }

    fn tolerates_null_strings() {
        let data = vk::DebugUtilsMessengerCallbackDataEXT::default();
        let diag = unsafe { diagnostic_from_vk(
            vk::DebugUtilsMessageSeverityFlagsEXT::WARNING,
            vk::DebugUtilsMessageTypeFlagsEXT::GENERAL,
            &data,
        ) };
        assert_eq!(diag.id_name, "");
        assert_eq!(diag.message, "");
        assert!(diag.objects.is_empty());
    }

    fn forwards_to_dispatcher() {
        #[derive(Debug, Default)]
        struct Count(std::sync::atomic::AtomicU32);

        impl monitor::DiagnosticSink for Count {
            fn handle(&self, _: Diagnostic) {
                self.0.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            }
        }

        let dispatcher = Dispatcher::new();
        let count = Arc::new(Count::default());
        let _reg = dispatcher.attach(count.clone()).unwrap();
        let target = MessengerTarget::new(Arc::clone(&dispatcher));
        let info = target.create_info();
        let callback = info.pfn_user_callback.unwrap();
        let data = vk::DebugUtilsMessengerCallbackDataEXT::default();
        unsafe {
            callback(
                vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
                vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION,
                &data,
                info.p_user_data,
            );
        }
        assert_eq!(count.0.load(std::sync::atomic::Ordering::Relaxed), 1);
        assert_eq!(dispatcher.delivered_count(), 1);
    }

    unit::declare_tests![
        converts_severity,
        converts_types,
        copies_callback_data,
        tolerates_null_strings,
        forwards_to_dispatcher,
    ];
}

#[cfg(test)]
unit::collect_tests![tests];
