//! OpenCL C source generation
//!
//! Every builtin is exercised by one kernel per vector width. Types are
//! emitted as `#define`s so the body text is the same for all precisions:
//!
//! ```text
//! #define RETTYPE float4
//! #define RETTYPE_SCALAR float
//! #define TYPE1 float4
//! #define TYPE1_SCALAR float
//! #define UNDEF1 NAN
//!
//! __kernel void math_kernel4(__global RETTYPE* out, __global TYPE1* in1)
//! {
//!     size_t i = get_global_id(0);
//!     out[i] = sin(in1[i]);
//! }
//! ```
//!
//! Width 3 kernels address scalar buffers with `vload3`/`vstore3`. The last
//! work item handles the one or two elements left over when the buffer length
//! is not a multiple of three, selecting by `i & 1` and padding unused lanes
//! with `UNDEF` values.

use std::fmt::Write as _;

use mathcheck_core::{Precision, Signature, Spelling};

use crate::device::{KernelSource, KernelSpec, ScalarType};

/// Vector widths exercised for every builtin.
pub const VECTOR_WIDTHS: [u32; 6] = [1, 2, 3, 4, 8, 16];

/// Argument types of one kernel, outputs first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelLayout {
    pub outputs: Vec<ScalarType>,
    pub inputs: Vec<ScalarType>,
}

impl KernelLayout {
    /// Buffer arguments in launch order: outputs, then inputs.
    pub fn arguments(&self) -> impl Iterator<Item = ScalarType> + '_ {
        self.outputs.iter().chain(&self.inputs).copied()
    }
}

/// Argument layout for `signature` at `precision` and `vector_width`.
///
/// Relational results are `int` for scalars and the signed integer of the
/// argument width for vectors.
pub fn layout(signature: Signature, precision: Precision, vector_width: u32) -> KernelLayout {
    let t = ScalarType::float(precision);
    let relational = if vector_width == 1 {
        ScalarType::Int
    } else {
        ScalarType::signed(precision)
    };

    let (outputs, inputs) = match signature {
        Signature::Unary => (vec![t], vec![t]),
        Signature::UnsignedUnary => (vec![t], vec![ScalarType::unsigned(precision)]),
        Signature::IntUnary => (vec![ScalarType::Int], vec![t]),
        Signature::Binary => (vec![t], vec![t, t]),
        Signature::BinaryInt => (vec![t], vec![t, ScalarType::Int]),
        Signature::Ternary => (vec![t], vec![t, t, t]),
        Signature::UnaryTwoResults => (vec![t, t], vec![t]),
        Signature::UnaryIntResult => (vec![t, ScalarType::Int], vec![t]),
        Signature::BinaryIntResult => (vec![t, ScalarType::Int], vec![t, t]),
        Signature::MacroUnary => (vec![relational], vec![t]),
        Signature::MacroBinary => (vec![relational], vec![t, t]),
    };
    KernelLayout { outputs, inputs }
}

/// Build options for a program.
pub fn build_options(force_ftz: bool, correctly_rounded_divide_sqrt: bool, relaxed: bool) -> String {
    let mut options = String::new();
    if force_ftz {
        options.push_str(" -cl-denorms-are-zero");
    }
    if correctly_rounded_divide_sqrt {
        options.push_str(" -cl-fp32-correctly-rounded-divide-sqrt");
    }
    if relaxed {
        options.push_str(" -cl-fast-relaxed-math");
    }
    options
}

/// Generate the kernel for `spec`.
pub fn generate(spec: KernelSpec) -> KernelSource {
    let kernel_name = spec.kernel_name();
    let layout = layout(spec.function.signature(), spec.precision, spec.vector_width);
    let suffix = width_suffix(spec.vector_width);
    let vec3 = spec.vector_width == 3;

    let mut text = String::new();
    let out_names = output_macros(&layout);
    for (name, ty) in out_names.iter().zip(&layout.outputs) {
        define_type(&mut text, name, *ty, &suffix);
    }
    for (index, ty) in layout.inputs.iter().enumerate() {
        define_type(&mut text, &format!("TYPE{}", index + 1), *ty, &suffix);
    }
    for (index, ty) in layout.inputs.iter().enumerate() {
        let _ = writeln!(text, "#define UNDEF{} {}", index + 1, ty.undef_value());
    }
    if let Some(second) = layout.outputs.get(1) {
        let _ = writeln!(text, "#define UNDEFR2 {}", second.undef_value());
    }
    if layout.arguments().any(|ty| ty == ScalarType::Double) {
        text.push_str("#pragma OPENCL EXTENSION cl_khr_fp64 : enable\n");
    }
    if layout.arguments().any(|ty| ty == ScalarType::Half) {
        text.push_str("#pragma OPENCL EXTENSION cl_khr_fp16 : enable\n");
    }

    signature_line(&mut text, &kernel_name, &layout, &out_names, vec3);
    if vec3 {
        vec3_body(&mut text, spec, &layout, &out_names);
    } else {
        vector_body(&mut text, spec, &layout, &out_names);
    }

    KernelSource { spec, kernel_name, text }
}

fn width_suffix(width: u32) -> String {
    if width == 1 {
        String::new()
    } else {
        width.to_string()
    }
}

fn output_macros(layout: &KernelLayout) -> Vec<&'static str> {
    if layout.outputs.len() == 1 {
        vec!["RETTYPE"]
    } else {
        vec!["RETTYPE1", "RETTYPE2"]
    }
}

fn output_arg(layout: &KernelLayout, index: usize) -> String {
    if layout.outputs.len() == 1 {
        "out".to_string()
    } else {
        format!("out{}", index + 1)
    }
}

fn define_type(text: &mut String, name: &str, ty: ScalarType, suffix: &str) {
    let _ = writeln!(text, "#define {name} {ty}{suffix}");
    let _ = writeln!(text, "#define {name}_SCALAR {ty}");
}

fn signature_line(text: &mut String, kernel_name: &str, layout: &KernelLayout, out_names: &[&str], vec3: bool) {
    let scalar = if vec3 { "_SCALAR" } else { "" };
    let mut params = Vec::new();
    for (index, name) in out_names.iter().enumerate() {
        params.push(format!("__global {name}{scalar}* {}", output_arg(layout, index)));
    }
    for index in 1..=layout.inputs.len() {
        params.push(format!("__global TYPE{index}{scalar}* in{index}"));
    }
    let _ = write!(
        text,
        "\n__kernel void {kernel_name}({})\n{{\n    size_t i = get_global_id(0);\n",
        params.join(",\n                          ")
    );
}

/// Expression applying the builtin to `args`, with an optional pointer to the
/// second result.
fn invocation(spec: KernelSpec, args: &[String], second: Option<&str>) -> String {
    let code = spec.function.code_name;
    match spec.function.spelling() {
        Spelling::Assignment => args[0].clone(),
        Spelling::Prefix => format!("{code}{}", args[0]),
        Spelling::Infix => format!("{} {code} {}", args[0], args[1]),
        Spelling::Call => {
            let mut list = args.to_vec();
            list.extend(second.map(str::to_string));
            format!("{code}({})", list.join(", "))
        }
    }
}

fn vector_body(text: &mut String, spec: KernelSpec, layout: &KernelLayout, out_names: &[&str]) {
    let args: Vec<String> = (1..=layout.inputs.len()).map(|n| format!("in{n}[i]")).collect();
    let second = (out_names.len() == 2).then(|| "out2 + i".to_string());
    let call = invocation(spec, &args, second.as_deref());
    let _ = write!(text, "    {}[i] = {call};\n}}\n", output_arg(layout, 0));
}

const LOCALS: [&str; 3] = ["a", "b", "c"];

fn vec3_body(text: &mut String, spec: KernelSpec, layout: &KernelLayout, out_names: &[&str]) {
    let arity = layout.inputs.len();
    let args: Vec<String> = LOCALS[..arity].iter().map(|s| s.to_string()).collect();
    let two = out_names.len() == 2;
    let call = invocation(spec, &args, two.then_some("&res2"));
    let first = if two { "res1" } else { "res" };
    let first_type = out_names[0];

    // Full vectors
    text.push_str("\n    if (i + 1 < get_global_size(0))\n    {\n");
    for (n, local) in LOCALS[..arity].iter().enumerate() {
        let _ = writeln!(text, "        TYPE{0} {local} = vload3(0, in{0} + 3 * i);", n + 1);
    }
    if two {
        text.push_str("        RETTYPE2 res2 = UNDEFR2;\n");
    }
    let _ = writeln!(text, "        {first_type} {first} = {call};");
    let _ = writeln!(text, "        vstore3({first}, 0, {} + 3 * i);", output_arg(layout, 0));
    if two {
        text.push_str("        vstore3(res2, 0, out2 + 3 * i);\n");
    }

    // Tail of one or two elements
    text.push_str("    }\n    else\n    {\n        size_t parity = i & 1;\n");
    for (n, local) in LOCALS[..arity].iter().enumerate() {
        let _ = writeln!(
            text,
            "        TYPE{0} {local} = (TYPE{0})(UNDEF{0}, UNDEF{0}, UNDEF{0});",
            n + 1
        );
    }
    text.push_str("        switch (parity)\n        {\n            case 0:\n");
    for (n, local) in LOCALS[..arity].iter().enumerate() {
        let _ = writeln!(text, "                {local}.y = in{}[3 * i + 1];", n + 1);
    }
    text.push_str("                // fall through\n            case 1:\n");
    for (n, local) in LOCALS[..arity].iter().enumerate() {
        let _ = writeln!(text, "                {local}.x = in{}[3 * i];", n + 1);
    }
    text.push_str("                break;\n        }\n\n");
    if two {
        text.push_str("        RETTYPE2 res2 = UNDEFR2;\n");
    }
    let _ = writeln!(text, "        {first_type} {first} = {call};\n");

    let out1 = output_arg(layout, 0);
    text.push_str("        switch (parity)\n        {\n            case 0:\n");
    let _ = writeln!(text, "                {out1}[3 * i + 1] = {first}.y;");
    if two {
        text.push_str("                out2[3 * i + 1] = res2.y;\n");
    }
    text.push_str("                // fall through\n            case 1:\n");
    let _ = writeln!(text, "                {out1}[3 * i] = {first}.x;");
    if two {
        text.push_str("                out2[3 * i] = res2.x;\n");
    }
    text.push_str("                break;\n        }\n    }\n}\n");
}
