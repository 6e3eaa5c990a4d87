//! Handles, capabilities and kernel descriptions

use std::fmt;

use mathcheck_core::{FunctionDescriptor, Precision};

/// Handle to an allocated device buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle(pub u64);

impl BufferHandle {
    /// Create a new buffer handle
    pub const fn new(id: u64) -> Self {
        BufferHandle(id)
    }

    /// Get the internal ID
    pub const fn id(self) -> u64 {
        self.0
    }
}

impl fmt::Display for BufferHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "buf{}", self.0)
    }
}

/// Handle to a built program
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgramHandle(pub u64);

impl ProgramHandle {
    pub const fn new(id: u64) -> Self {
        ProgramHandle(id)
    }

    pub const fn id(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ProgramHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "prog{}", self.0)
    }
}

/// Capabilities that decide which tests run and how results are judged
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub name: String,
    /// `cl_khr_fp64`
    pub fp64: bool,
    /// `cl_khr_fp16`
    pub fp16: bool,
    /// Single precision denormals are supported
    pub denormals: bool,
    /// Infinities and NaNs are supported
    pub inf_nan: bool,
    /// `CL_FP_CORRECTLY_ROUNDED_DIVIDE_SQRT`
    pub correctly_rounded_divide_sqrt: bool,
    /// Embedded profile
    pub embedded: bool,
    /// Single precision rounds to nearest even. Embedded devices may round
    /// toward zero instead.
    pub round_to_nearest: bool,
}

impl DeviceInfo {
    /// Full-profile device with every optional capability.
    pub fn full(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fp64: true,
            fp16: true,
            denormals: true,
            inf_nan: true,
            correctly_rounded_divide_sqrt: true,
            embedded: false,
            round_to_nearest: true,
        }
    }

    /// Whether kernels of `precision` can be built at all.
    pub fn supports(&self, precision: Precision) -> bool {
        match precision {
            Precision::Half => self.fp16,
            Precision::Float => true,
            Precision::Double => self.fp64,
        }
    }
}

/// Scalar element types appearing in kernel signatures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarType {
    Half,
    Float,
    Double,
    Short,
    Int,
    Long,
    UShort,
    UInt,
    ULong,
}

impl ScalarType {
    /// Floating type of `precision`.
    pub const fn float(precision: Precision) -> Self {
        match precision {
            Precision::Half => ScalarType::Half,
            Precision::Float => ScalarType::Float,
            Precision::Double => ScalarType::Double,
        }
    }

    /// Unsigned integer with the width of `precision`.
    pub const fn unsigned(precision: Precision) -> Self {
        match precision {
            Precision::Half => ScalarType::UShort,
            Precision::Float => ScalarType::UInt,
            Precision::Double => ScalarType::ULong,
        }
    }

    /// Signed integer with the width of `precision` (vector relational results).
    pub const fn signed(precision: Precision) -> Self {
        match precision {
            Precision::Half => ScalarType::Short,
            Precision::Float => ScalarType::Int,
            Precision::Double => ScalarType::Long,
        }
    }

    /// OpenCL C spelling.
    pub const fn name(self) -> &'static str {
        match self {
            ScalarType::Half => "half",
            ScalarType::Float => "float",
            ScalarType::Double => "double",
            ScalarType::Short => "short",
            ScalarType::Int => "int",
            ScalarType::Long => "long",
            ScalarType::UShort => "ushort",
            ScalarType::UInt => "uint",
            ScalarType::ULong => "ulong",
        }
    }

    pub const fn size_bytes(self) -> usize {
        match self {
            ScalarType::Half | ScalarType::Short | ScalarType::UShort => 2,
            ScalarType::Float | ScalarType::Int | ScalarType::UInt => 4,
            ScalarType::Double | ScalarType::Long | ScalarType::ULong => 8,
        }
    }

    /// Value given to unused lanes of a partial vector.
    pub const fn undef_value(self) -> &'static str {
        match self {
            ScalarType::Half | ScalarType::Float | ScalarType::Double => "NAN",
            ScalarType::Short | ScalarType::UShort => "0x1234",
            ScalarType::Int | ScalarType::UInt => "0x12345678",
            ScalarType::Long | ScalarType::ULong => "0x0ddf00dbadc0ffee",
        }
    }

    pub const fn is_float(self) -> bool {
        matches!(self, ScalarType::Half | ScalarType::Float | ScalarType::Double)
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Everything needed to generate, build and run one kernel
#[derive(Debug, Clone, Copy)]
pub struct KernelSpec {
    pub function: &'static FunctionDescriptor,
    pub precision: Precision,
    /// Vector width: 1, 2, 3, 4, 8 or 16.
    pub vector_width: u32,
}

impl KernelSpec {
    pub const fn new(function: &'static FunctionDescriptor, precision: Precision, vector_width: u32) -> Self {
        Self {
            function,
            precision,
            vector_width,
        }
    }

    /// Kernel entry point name, `math_kernel` followed by the width suffix.
    pub fn kernel_name(&self) -> String {
        if self.vector_width == 1 {
            "math_kernel".to_string()
        } else {
            format!("math_kernel{}", self.vector_width)
        }
    }
}

/// Generated kernel source plus the description it was generated from
#[derive(Debug, Clone)]
pub struct KernelSource {
    pub spec: KernelSpec,
    pub kernel_name: String,
    pub text: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handles_display_with_prefix() {
        assert_eq!(BufferHandle::new(3).to_string(), "buf3");
        assert_eq!(ProgramHandle::new(7).to_string(), "prog7");
    }

    #[test]
    fn capability_gates_precision() {
        let mut info = DeviceInfo::full("test");
        assert!(info.supports(Precision::Double));
        info.fp64 = false;
        assert!(!info.supports(Precision::Double));
        assert!(info.supports(Precision::Float));
    }

    #[test]
    fn integer_companions_match_width() {
        for precision in Precision::ALL {
            assert_eq!(ScalarType::unsigned(precision).size_bytes(), precision.size_bytes());
            assert_eq!(ScalarType::signed(precision).size_bytes(), precision.size_bytes());
            assert_eq!(ScalarType::float(precision).size_bytes(), precision.size_bytes());
        }
    }

    #[test]
    fn kernel_names() {
        let sin = mathcheck_core::lookup("sin").unwrap();
        assert_eq!(KernelSpec::new(sin, Precision::Float, 1).kernel_name(), "math_kernel");
        assert_eq!(KernelSpec::new(sin, Precision::Float, 16).kernel_name(), "math_kernel16");
    }
}
