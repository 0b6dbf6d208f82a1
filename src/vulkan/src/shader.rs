//! SPIR-V for the draw-time scenarios, assembled in place so that no
//! shader compiler is needed to run them.
use rspirv::binary::Assemble;
use rspirv::dr::{Builder, Operand};
use rspirv::spirv;

/// Component type of the texel a fragment shader samples.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SampledType {
    Float,
    Sint,
    Uint,
}

impl SampledType {
    /// The sampled type of a color format. Integer formats are listed;
    /// everything else samples as float.
    pub fn of(format: ash::vk::Format) -> Self {
        use ash::vk::Format as F;
        match format {
            F::R8_SINT | F::R8G8_SINT | F::R8G8B8_SINT | F::R8G8B8A8_SINT
            | F::B8G8R8A8_SINT | F::R16_SINT | F::R16G16_SINT
            | F::R16G16B16_SINT | F::R16G16B16A16_SINT | F::R32_SINT
            | F::R32G32_SINT | F::R32G32B32_SINT | F::R32G32B32A32_SINT
            | F::R64_SINT | F::R64G64_SINT | F::R64G64B64_SINT
            | F::R64G64B64A64_SINT => SampledType::Sint,
            F::R8_UINT | F::R8G8_UINT | F::R8G8B8_UINT | F::R8G8B8A8_UINT
            | F::B8G8R8A8_UINT | F::R16_UINT | F::R16G16_UINT
            | F::R16G16B16_UINT | F::R16G16B16A16_UINT | F::R32_UINT
            | F::R32G32_UINT | F::R32G32B32_UINT | F::R32G32B32A32_UINT
            | F::R64_UINT | F::R64G64_UINT | F::R64G64B64_UINT
            | F::R64G64B64A64_UINT => SampledType::Uint,
            _ => SampledType::Float,
        }
    }
}

fn shader_builder() -> Builder {
    let mut b = Builder::new();
    b.set_version(1, 0);
    b.capability(spirv::Capability::Shader);
    b.memory_model(spirv::AddressingModel::Logical, spirv::MemoryModel::GLSL450);
    b
}

/// A vertex shader writing a constant position.
pub fn constant_vertex_shader() -> anyhow::Result<Vec<u32>> {
    let mut b = shader_builder();
    let void = b.type_void();
    let main_ty = b.type_function(void, []);
    let float = b.type_float(32);
    let vec4 = b.type_vector(float, 4);
    let out_vec4 = b.type_pointer(None, spirv::StorageClass::Output, vec4);

    let position =
        b.variable(out_vec4, None, spirv::StorageClass::Output, None);
    b.decorate(position, spirv::Decoration::BuiltIn,
        vec![Operand::BuiltIn(spirv::BuiltIn::Position)]);
    let zero = b.constant_f32(float, 0.0);
    let one = b.constant_f32(float, 1.0);
    let origin = b.constant_composite(vec4, vec![zero, zero, zero, one]);

    let main = b.begin_function(
        void, None, spirv::FunctionControl::NONE, main_ty)?;
    b.begin_block(None)?;
    b.store(position, origin, None, [])?;
    b.ret()?;
    b.end_function()?;
    b.entry_point(spirv::ExecutionModel::Vertex, main, "main", vec![position]);

    Ok(b.module().assemble())
}

/// A fragment shader sampling the combined image sampler at set 0,
/// binding 0 and writing the texel to location 0 as a `vec4`.
pub fn sampling_fragment_shader(ty: SampledType) ->
    anyhow::Result<Vec<u32>>
{
    let mut b = shader_builder();
    let void = b.type_void();
    let main_ty = b.type_function(void, []);
    let float = b.type_float(32);
    let vec2 = b.type_vector(float, 2);
    let vec4 = b.type_vector(float, 4);
    let (component, texel_ty) = match ty {
        SampledType::Float => (float, vec4),
        SampledType::Sint | SampledType::Uint => {
            let int = b.type_int(32, (ty == SampledType::Sint) as u32);
            (int, b.type_vector(int, 4))
        },
    };
    let image = b.type_image(
        component,
        spirv::Dim::Dim2D,
        0, 0, 0, 1,
        spirv::ImageFormat::Unknown,
        None,
    );
    let sampled_image = b.type_sampled_image(image);
    let uniform_ptr = b.type_pointer(
        None, spirv::StorageClass::UniformConstant, sampled_image);
    let out_vec4 = b.type_pointer(None, spirv::StorageClass::Output, vec4);

    let texture = b.variable(
        uniform_ptr, None, spirv::StorageClass::UniformConstant, None);
    b.decorate(texture, spirv::Decoration::DescriptorSet,
        vec![Operand::LiteralInt32(0)]);
    b.decorate(texture, spirv::Decoration::Binding,
        vec![Operand::LiteralInt32(0)]);
    let color = b.variable(out_vec4, None, spirv::StorageClass::Output, None);
    b.decorate(color, spirv::Decoration::Location,
        vec![Operand::LiteralInt32(0)]);
    let one = b.constant_f32(float, 1.0);
    let coord = b.constant_composite(vec2, vec![one, one]);

    let main = b.begin_function(
        void, None, spirv::FunctionControl::NONE, main_ty)?;
    b.begin_block(None)?;
    let loaded = b.load(sampled_image, None, texture, None, [])?;
    let texel = b.image_sample_implicit_lod(
        texel_ty, None, loaded, coord, None, [])?;
    let value = match ty {
        SampledType::Float => texel,
        SampledType::Sint => b.convert_s_to_f(vec4, None, texel)?,
        SampledType::Uint => b.convert_u_to_f(vec4, None, texel)?,
    };
    b.store(color, value, None, [])?;
    b.ret()?;
    b.end_function()?;
    b.entry_point(spirv::ExecutionModel::Fragment, main, "main", vec![color]);
    b.execution_mode(main, spirv::ExecutionMode::OriginUpperLeft, []);

    Ok(b.module().assemble())
}


#[cfg(test)]
unit::collect_tests![tests];
