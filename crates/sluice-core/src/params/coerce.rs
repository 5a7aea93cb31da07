/// Conversion from a raw parameter string.
///
/// Conversions never panic. A value that does not parse yields `None`, and
/// whitespace is not trimmed.
pub trait FromParam: Sized {
    fn from_param(value: &str) -> Option<Self>;
}

impl FromParam for String {
    fn from_param(value: &str) -> Option<Self> {
        Some(value.to_string())
    }
}

/// `"true"` in any case is `true`, everything else is `false`.
impl FromParam for bool {
    fn from_param(value: &str) -> Option<Self> {
        Some(value.eq_ignore_ascii_case("true"))
    }
}

macro_rules! impl_from_param_parse {
    ($($ty:ty),* $(,)?) => {
        $(
            impl FromParam for $ty {
                fn from_param(value: &str) -> Option<Self> {
                    value.parse().ok()
                }
            }
        )*
    };
}

impl_from_param_parse!(i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, f32, f64, char);
