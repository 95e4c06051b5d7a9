//! Cheap per-build and per-unit gates, evaluated before any parsing

use crate::config::InstrumentationConfig;
use crate::unit::CompilationUnit;

/// Simple name of the module descriptor unit
pub const MODULE_DESCRIPTOR: &str = "module-info";

#[derive(Debug, Clone, Copy, Default)]
pub struct UnitFilter;

impl UnitFilter {
    pub fn new() -> Self {
        Self
    }

    /// Global gate: `false` means no unit in the build is touched
    pub fn is_enabled(&self, config: &InstrumentationConfig) -> bool {
        config.enabled()
    }

    /// Module descriptors have no method bodies and are never visited
    pub fn is_eligible(&self, unit: &CompilationUnit) -> bool {
        simple_name(&unit.name) != MODULE_DESCRIPTOR
    }
}

fn simple_name(name: &str) -> &str {
    name.rsplit(['/', '.']).next().unwrap_or(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InstrumentationMode;
    use test_case::test_case;

    #[test_case("module-info", false ; "bare")]
    #[test_case("com/example/module-info", false ; "internal name")]
    #[test_case("com.example.module-info", false ; "binary name")]
    #[test_case("com.example.ModuleInfo", true ; "ordinary class")]
    #[test_case("package-info", true ; "package descriptor")]
    #[test_case("module-info-extra", true ; "prefix only")]
    fn test_is_eligible(name: &str, expected: bool) {
        let unit = CompilationUnit::new(name, vec![0xde, 0xad]);
        assert_eq!(UnitFilter::new().is_eligible(&unit), expected);
    }

    #[test_case(InstrumentationMode::None, false)]
    #[test_case(InstrumentationMode::Assert, true)]
    #[test_case(InstrumentationMode::Exception, true)]
    fn test_is_enabled(mode: InstrumentationMode, expected: bool) {
        let config = InstrumentationConfig::new(mode, "a.Marker");
        assert_eq!(UnitFilter::new().is_enabled(&config), expected);
    }
}
