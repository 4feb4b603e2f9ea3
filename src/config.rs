//! Conversion settings
//!
//! Loaded from an optional YAML file; every field has a default so an empty
//! file (or no file) is a valid configuration. Unknown keys are rejected so a
//! typo does not silently fall back to a default.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::{ConvertError, ConvertResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConvertConfig {
    /// Drop hardcoded cells that no formula reads
    pub delete_unreferenced_hardcoded_values: bool,
    /// File name of the generated program
    pub script_name: String,
    /// File name of the external-path manifest
    pub manifest_name: String,
    /// Base name of the analysis report (`.json` / `.xlsx` appended)
    pub report_name: String,
    /// Also render the report as a workbook
    pub write_report_xlsx: bool,
}

impl Default for ConvertConfig {
    fn default() -> Self {
        Self {
            delete_unreferenced_hardcoded_values: false,
            script_name: "calculate.py".to_string(),
            manifest_name: "input_files_config.json".to_string(),
            report_name: "analysis_report".to_string(),
            write_report_xlsx: true,
        }
    }
}

impl ConvertConfig {
    /// Load from a YAML file, or defaults when no path is given
    pub fn load(path: Option<&Path>) -> ConvertResult<Self> {
        match path {
            Some(path) => {
                let content = fs::read_to_string(path)?;
                Self::from_yaml(&content)
            }
            None => Ok(Self::default()),
        }
    }

    pub fn from_yaml(content: &str) -> ConvertResult<Self> {
        let config: Self = if content.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml::from_str(content)?
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> ConvertResult<()> {
        for (field, name) in [
            ("script_name", &self.script_name),
            ("manifest_name", &self.manifest_name),
            ("report_name", &self.report_name),
        ] {
            if name.is_empty() || name.contains(['/', '\\']) {
                return Err(ConvertError::Config(format!(
                    "{} must be a plain file name, got '{}'",
                    field, name
                )));
            }
        }
        if !self.script_name.ends_with(".py") {
            return Err(ConvertError::Config(format!(
                "script_name must end in .py, got '{}'",
                self.script_name
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_is_default() {
        assert_eq!(ConvertConfig::from_yaml("").unwrap(), ConvertConfig::default());
        assert_eq!(ConvertConfig::load(None).unwrap(), ConvertConfig::default());
    }

    #[test]
    fn test_partial_config_keeps_defaults() {
        let config =
            ConvertConfig::from_yaml("delete_unreferenced_hardcoded_values: true\n").unwrap();
        assert!(config.delete_unreferenced_hardcoded_values);
        assert_eq!(config.script_name, "calculate.py");
        assert!(config.write_report_xlsx);
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        let err = ConvertConfig::from_yaml("delete_unreferenced: true\n").unwrap_err();
        assert!(matches!(err, ConvertError::Yaml(_)));
    }

    #[test]
    fn test_script_name_is_validated() {
        let err = ConvertConfig::from_yaml("script_name: out/calc.py\n").unwrap_err();
        assert!(err.to_string().contains("plain file name"));
        let err = ConvertConfig::from_yaml("script_name: calc.rb\n").unwrap_err();
        assert!(err.to_string().contains(".py"));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("xl2py.yaml");
        fs::write(&path, "write_report_xlsx: false\nscript_name: model.py\n").unwrap();
        let config = ConvertConfig::load(Some(&path)).unwrap();
        assert!(!config.write_report_xlsx);
        assert_eq!(config.script_name, "model.py");
    }
}
