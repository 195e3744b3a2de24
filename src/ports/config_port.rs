//! Configuration access port trait.

/// Sectioned key/value lookup. Missing keys fall back to the caller's default;
/// values that are present but unparsable are reported by `config_validation`.
pub trait ConfigPort {
    fn get_string(&self, section: &str, key: &str) -> Option<String>;
    fn get_int(&self, section: &str, key: &str, default: i64) -> i64;
    fn get_double(&self, section: &str, key: &str, default: f64) -> f64;
    fn get_bool(&self, section: &str, key: &str, default: bool) -> bool;

    /// All keys present in `section`, sorted.
    fn keys(&self, section: &str) -> Vec<String>;
}
