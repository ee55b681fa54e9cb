use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Sizes and startup options for a new instance.
///
/// Every field has a default, so a TOML table only needs to name the
/// values it changes.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Params {
    #[serde(default = "Params::default_stack_elems")]
    pub stack_elems: usize,
    #[serde(default = "Params::default_return_stack_elems")]
    pub return_stack_elems: usize,
    #[serde(default = "Params::default_float_stack_elems")]
    pub float_stack_elems: usize,
    #[serde(default = "Params::default_heap_bytes")]
    pub heap_bytes: usize,
    #[serde(default = "Params::default_dict_entries")]
    pub dict_entries: usize,
    /// Number of rotating buffers for strings created while interpreting.
    #[serde(default = "Params::default_temp_strings")]
    pub temp_strings: usize,
    #[serde(default = "Params::default_temp_string_len")]
    pub temp_string_len: usize,
    /// Record entered words for error reports.
    #[serde(default = "Params::default_walkback")]
    pub walkback: bool,
    /// Directories searched by `load_module` and `which_lib`.
    #[serde(default)]
    pub load_path: Vec<PathBuf>,
}

impl Params {
    pub fn from_toml(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }

    const fn default_stack_elems() -> usize {
        1000
    }

    const fn default_return_stack_elems() -> usize {
        1000
    }

    const fn default_float_stack_elems() -> usize {
        100
    }

    const fn default_heap_bytes() -> usize {
        64 * 1024
    }

    const fn default_dict_entries() -> usize {
        4096
    }

    const fn default_temp_strings() -> usize {
        4
    }

    const fn default_temp_string_len() -> usize {
        256
    }

    const fn default_walkback() -> bool {
        true
    }
}

impl Default for Params {
    fn default() -> Self {
        Self {
            stack_elems: Self::default_stack_elems(),
            return_stack_elems: Self::default_return_stack_elems(),
            float_stack_elems: Self::default_float_stack_elems(),
            heap_bytes: Self::default_heap_bytes(),
            dict_entries: Self::default_dict_entries(),
            temp_strings: Self::default_temp_strings(),
            temp_string_len: Self::default_temp_string_len(),
            walkback: Self::default_walkback(),
            load_path: Vec::new(),
        }
    }
}

#[cfg(test)]
pub mod test {
    use super::Params;

    #[test]
    fn partial_toml() {
        let params = Params::from_toml(
            r#"
            heap_bytes = 4096
            walkback = false
            load_path = ["/usr/share/pez"]
            "#,
        )
        .unwrap();
        assert_eq!(params.heap_bytes, 4096);
        assert!(!params.walkback);
        assert_eq!(params.stack_elems, Params::default().stack_elems);
        assert_eq!(params.load_path.len(), 1);
    }

    #[test]
    fn rejects_bad_types() {
        assert!(Params::from_toml("stack_elems = \"lots\"").is_err());
    }
}
