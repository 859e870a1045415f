//! Launch configuration management
//!
//! This crate handles parsing the launch configurations, primarily of VS Code.

use std::path::{Path, PathBuf};

use eyre::Context;
use serde::Deserialize;

/// Handle choosing a specific launch configuration, or if the user has not specified one, then
/// present a list of launch configurations they can choose from
#[derive(Debug)]
pub enum ChosenLaunchConfiguration {
    /// A specific launch configuration is available
    Specific(LaunchConfiguration),
    /// The specified launch configuration was not found
    NotFound,
    /// The user did not request a specific launch configuration, so present available options
    ToBeChosen(Vec<String>),
}

#[derive(Deserialize)]
struct VsCodeLaunchConfiguration {
    #[serde(rename = "version")]
    _version: String,
    configurations: Vec<LaunchConfiguration>,
}

/// Deserializable model for the launch configuration
#[derive(Deserialize)]
#[serde(untagged)]
enum ConfigFormat {
    VsCode(VsCodeLaunchConfiguration),
    VsCodeWorkspace {
        launch: VsCodeLaunchConfiguration,
    },
}

/// One entry of a VS Code `launch.json`, keyed by debugger type.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum LaunchConfiguration {
    Sbpf(SbpfLaunch),
}

impl LaunchConfiguration {
    fn name(&self) -> &str {
        match self {
            LaunchConfiguration::Sbpf(sbpf) => &sbpf.name,
        }
    }

    /// Resolve relative paths against a workspace root.
    pub fn resolve(&mut self, root: impl AsRef<Path>) {
        match self {
            LaunchConfiguration::Sbpf(sbpf) => sbpf.resolve(root),
        }
    }
}

/// Launch parameters for an sBPF debugging session.
///
/// Consumed once at session start; the bridge derives the backend's
/// command-line argument set from these fields.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SbpfLaunch {
    pub name: String,
    pub request: String,

    /// Path to the assembly program to debug.
    pub program: PathBuf,

    /// Optional path to a separate debug-info file.
    #[serde(default)]
    pub debug_info: Option<PathBuf>,

    /// Program input: a file reference or literal byte string.
    #[serde(default = "default_input")]
    pub input: String,

    /// Heap size in bytes. Backend default when unset.
    #[serde(default)]
    pub heap_size: Option<u64>,

    /// Maximal number of instructions to execute.
    #[serde(default = "default_max_instructions")]
    pub max_instructions: u64,

    /// Stop at the entry instruction before executing anything.
    #[serde(default)]
    pub stop_on_entry: bool,

    /// Path to the backend executable. Looked up on `PATH` when unset.
    #[serde(default)]
    pub debugger_path: Option<PathBuf>,
}

fn default_input() -> String {
    "0".to_string()
}

fn default_max_instructions() -> u64 {
    10_000
}

impl SbpfLaunch {
    /// Build a launch configuration directly from a program path, with
    /// every other field at its default.
    pub fn from_program(program: impl Into<PathBuf>) -> Self {
        Self {
            name: "launch".to_string(),
            request: "launch".to_string(),
            program: program.into(),
            debug_info: None,
            input: default_input(),
            heap_size: None,
            max_instructions: default_max_instructions(),
            stop_on_entry: false,
            debugger_path: None,
        }
    }

    fn resolve(&mut self, root: impl AsRef<Path>) {
        let root = root.as_ref();
        if self.program.is_relative() {
            self.program = root.join(&self.program);
        }
        if let Some(debug_info) = &self.debug_info {
            if debug_info.is_relative() {
                self.debug_info = Some(root.join(debug_info));
            }
        }
    }
}

pub fn load(
    name: Option<&String>,
    mut r: impl std::io::Read,
) -> eyre::Result<ChosenLaunchConfiguration> {
    let mut contents = String::new();
    r.read_to_string(&mut contents)
        .wrap_err("reading configuration contents")?;
    let configuration = from_str(name, &contents).wrap_err("parsing launch configuration")?;
    Ok(configuration)
}

pub fn load_from_path(
    name: Option<&String>,
    path: impl AsRef<Path>,
) -> eyre::Result<ChosenLaunchConfiguration> {
    let f = std::fs::File::open(path).wrap_err("opening input path")?;
    let config = crate::load(name, f).context("loading file from given path")?;
    Ok(config)
}

fn from_str(name: Option<&String>, contents: &str) -> eyre::Result<ChosenLaunchConfiguration> {
    let config = jsonc_to_serde(contents).wrap_err("parsing jsonc configuration")?;

    let configurations = match config {
        ConfigFormat::VsCode(VsCodeLaunchConfiguration { configurations, .. }) => configurations,
        ConfigFormat::VsCodeWorkspace {
            launch: VsCodeLaunchConfiguration { configurations, .. },
        } => configurations,
    };

    let Some(name) = name else {
        let configuration_names = configurations
            .iter()
            .map(|c| c.name().to_string())
            .collect();
        return Ok(ChosenLaunchConfiguration::ToBeChosen(configuration_names));
    };

    for configuration in configurations {
        if configuration.name() == name {
            return Ok(ChosenLaunchConfiguration::Specific(configuration));
        }
    }
    Ok(ChosenLaunchConfiguration::NotFound)
}

fn jsonc_to_serde(input: &str) -> eyre::Result<ConfigFormat> {
    let value = jsonc_parser::parse_to_serde_value(input, &Default::default())
        .wrap_err("parsing jsonc configuration")?;
    let Some(config_format_value) = value else {
        eyre::bail!("no configuration found");
    };

    let config_format =
        serde_json::from_value(config_format_value).wrap_err("deserializing jsonc::Value value")?;
    Ok(config_format)
}

#[cfg(test)]
mod tests {
    use super::*;

    const LAUNCH_JSON: &str = r#"{
        // sBPF debugging setup
        "version": "0.2.0",
        "configurations": [
            {
                "name": "Debug counter",
                "type": "sbpf",
                "request": "launch",
                "program": "programs/counter.s",
                "input": "1,0,0,0",
                "stopOnEntry": true
            },
            {
                "name": "Debug transfer",
                "type": "sbpf",
                "request": "launch",
                "program": "programs/transfer.s",
                "heapSize": 4096,
                "maxInstructions": 500
            }
        ]
    }"#;

    #[test]
    fn choose_specific_configuration() {
        let chosen = from_str(Some(&"Debug counter".to_string()), LAUNCH_JSON).unwrap();
        let ChosenLaunchConfiguration::Specific(LaunchConfiguration::Sbpf(sbpf)) = chosen else {
            panic!("expected specific configuration");
        };

        assert_eq!(sbpf.program, PathBuf::from("programs/counter.s"));
        assert_eq!(sbpf.input, "1,0,0,0");
        assert!(sbpf.stop_on_entry);
        // Defaults for omitted fields.
        assert_eq!(sbpf.max_instructions, 10_000);
        assert_eq!(sbpf.heap_size, None);
    }

    #[test]
    fn overridden_defaults() {
        let chosen = from_str(Some(&"Debug transfer".to_string()), LAUNCH_JSON).unwrap();
        let ChosenLaunchConfiguration::Specific(LaunchConfiguration::Sbpf(sbpf)) = chosen else {
            panic!("expected specific configuration");
        };

        assert_eq!(sbpf.heap_size, Some(4096));
        assert_eq!(sbpf.max_instructions, 500);
        assert_eq!(sbpf.input, "0");
        assert!(!sbpf.stop_on_entry);
    }

    #[test]
    fn missing_configuration() {
        let chosen = from_str(Some(&"nope".to_string()), LAUNCH_JSON).unwrap();
        assert!(matches!(chosen, ChosenLaunchConfiguration::NotFound));
    }

    #[test]
    fn list_configurations_when_no_name_given() {
        let chosen = from_str(None, LAUNCH_JSON).unwrap();
        let ChosenLaunchConfiguration::ToBeChosen(names) = chosen else {
            panic!("expected list of configurations");
        };
        assert_eq!(names, vec!["Debug counter", "Debug transfer"]);
    }

    #[test]
    fn load_configuration_from_disk() -> color_eyre::Result<()> {
        use std::io::Write as _;

        let mut file = tempfile::NamedTempFile::new()?;
        file.write_all(LAUNCH_JSON.as_bytes())?;

        let chosen = load_from_path(Some(&"Debug transfer".to_string()), file.path())?;
        let ChosenLaunchConfiguration::Specific(LaunchConfiguration::Sbpf(sbpf)) = chosen else {
            panic!("expected specific configuration");
        };
        assert_eq!(sbpf.program, PathBuf::from("programs/transfer.s"));
        assert_eq!(sbpf.heap_size, Some(4096));
        Ok(())
    }

    #[test]
    fn load_from_missing_path_reports_open_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_from_path(None, dir.path().join("launch.json")).unwrap_err();
        assert!(format!("{err:#}").contains("opening input path"));
    }

    #[test]
    fn resolve_relative_paths() {
        let chosen = from_str(Some(&"Debug counter".to_string()), LAUNCH_JSON).unwrap();
        let ChosenLaunchConfiguration::Specific(mut config) = chosen else {
            panic!("expected specific configuration");
        };

        config.resolve("/workspace");
        let LaunchConfiguration::Sbpf(sbpf) = config;
        assert_eq!(sbpf.program, PathBuf::from("/workspace/programs/counter.s"));
    }
}
