//! Tool Catalog
//!
//! Information Hiding:
//! - Descriptor storage and lookup hidden
//! - Prompt rendering of the catalog kept next to the data it renders

use super::{Arguments, ParamShape, ParamType, ToolDescriptor, ToolParameter};
use serde_json::Value;

pub const GET_EVENT_SCHEDULE: &str = "get_event_schedule";
pub const GET_EVENT_INFO: &str = "get_event_info";
pub const GET_SESSION_RESULTS: &str = "get_session_results";
pub const GET_DRIVER_INFO: &str = "get_driver_info";
pub const ANALYZE_DRIVER_PERFORMANCE: &str = "analyze_driver_performance";
pub const COMPARE_DRIVERS: &str = "compare_drivers";
pub const GET_TELEMETRY: &str = "get_telemetry";
pub const GET_CHAMPIONSHIP_STANDINGS: &str = "get_championship_standings";

/// Registry of the remote F1 tools, in declaration order.
#[derive(Debug, Clone)]
pub struct ToolCatalog {
    tools: Vec<ToolDescriptor>,
}

impl ToolCatalog {
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    /// Register a descriptor. A later registration under the same name replaces the earlier one.
    pub fn register(&mut self, descriptor: ToolDescriptor) {
        tracing::debug!("Registering tool: {}", descriptor.name);
        match self.tools.iter_mut().find(|t| t.name == descriptor.name) {
            Some(existing) => *existing = descriptor,
            None => self.tools.push(descriptor),
        }
    }

    pub fn get(&self, name: &str) -> Option<&ToolDescriptor> {
        self.tools.iter().find(|t| t.name == name)
    }

    pub fn has_tool(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.tools.iter().map(|t| t.name.clone()).collect()
    }

    pub fn list_tools(&self) -> &[ToolDescriptor] {
        &self.tools
    }

    /// Whether any descriptor declares a parameter with this name.
    pub fn knows_parameter(&self, name: &str) -> bool {
        self.tools.iter().any(|t| t.parameter(name).is_some())
    }

    /// Required parameters of `tool` that are absent or null in `arguments`.
    pub fn missing_required(&self, tool: &str, arguments: &Arguments) -> Vec<String> {
        let Some(descriptor) = self.get(tool) else {
            return Vec::new();
        };
        descriptor
            .required_parameters()
            .filter(|p| matches!(arguments.get(&p.name), None | Some(Value::Null)))
            .map(|p| p.name.clone())
            .collect()
    }

    /// Catalog rendered for LLM prompts
    pub fn tools_description(&self) -> String {
        let mut descriptions = Vec::new();
        for tool in &self.tools {
            let params = tool
                .parameters
                .iter()
                .map(|p| {
                    let required = if p.required { "required" } else { "optional" };
                    format!("  - {} ({}): {} [{}]", p.name, p.param_type, p.description, required)
                })
                .collect::<Vec<_>>()
                .join("\n");

            descriptions.push(format!(
                "Tool: {}\nDescription: {}\nParameters:\n{}",
                tool.name, tool.description, params
            ));
        }
        descriptions.join("\n\n")
    }

    /// The eight tools exposed by the F1 data server.
    pub fn f1_defaults() -> Self {
        let mut catalog = Self::new();

        catalog.register(descriptor(
            GET_EVENT_SCHEDULE,
            "Get the race calendar for a Formula One season.",
            vec![year()],
        ));
        catalog.register(descriptor(
            GET_EVENT_INFO,
            "Get information about one event of a season.",
            vec![
                year(),
                param(
                    "identifier",
                    ParamType::String,
                    "Event name or round number, e.g. 'Monaco Grand Prix' or '7'",
                    true,
                ),
            ],
        ));
        catalog.register(descriptor(
            GET_SESSION_RESULTS,
            "Get classified results of a session (race, qualifying, sprint, practice).",
            vec![year(), event_identifier(), session_name()],
        ));
        catalog.register(descriptor(
            GET_DRIVER_INFO,
            "Get a driver's details and result in a specific session.",
            vec![year(), event_identifier(), session_name(), driver_identifier()],
        ));
        catalog.register(descriptor(
            ANALYZE_DRIVER_PERFORMANCE,
            "Analyze a driver's lap times and pace in a session.",
            vec![year(), event_identifier(), session_name(), driver_identifier()],
        ));
        catalog.register(descriptor(
            COMPARE_DRIVERS,
            "Compare the performance of several drivers in a session.",
            vec![
                year(),
                event_identifier(),
                session_name(),
                ToolParameter {
                    name: "drivers".to_string(),
                    param_type: ParamType::String,
                    shape: ParamShape::CommaJoined,
                    description: "Comma-separated three-letter driver codes, e.g. 'VER,HAM'"
                        .to_string(),
                    required: true,
                },
            ],
        ));
        catalog.register(descriptor(
            GET_TELEMETRY,
            "Get car telemetry for a driver's lap (fastest lap when no lap is given).",
            vec![
                year(),
                event_identifier(),
                session_name(),
                driver_identifier(),
                param("lap_number", ParamType::Number, "Lap number", false),
            ],
        ));
        catalog.register(descriptor(
            GET_CHAMPIONSHIP_STANDINGS,
            "Get drivers' and constructors' championship standings for a season.",
            vec![
                year(),
                param(
                    "round_num",
                    ParamType::Number,
                    "Standings after this round (latest when omitted)",
                    false,
                ),
            ],
        ));

        catalog
    }
}

impl Default for ToolCatalog {
    fn default() -> Self {
        Self::f1_defaults()
    }
}

fn descriptor(name: &str, description: &str, parameters: Vec<ToolParameter>) -> ToolDescriptor {
    ToolDescriptor {
        name: name.to_string(),
        description: description.to_string(),
        parameters,
    }
}

fn param(name: &str, param_type: ParamType, description: &str, required: bool) -> ToolParameter {
    ToolParameter {
        name: name.to_string(),
        param_type,
        shape: ParamShape::Single,
        description: description.to_string(),
        required,
    }
}

fn year() -> ToolParameter {
    param("year", ParamType::Number, "Season year, e.g. 2024", true)
}

fn event_identifier() -> ToolParameter {
    param(
        "event_identifier",
        ParamType::String,
        "Event name or round number, e.g. 'British Grand Prix'",
        true,
    )
}

fn session_name() -> ToolParameter {
    param(
        "session_name",
        ParamType::String,
        "Session: 'Race', 'Qualifying', 'Sprint', 'FP1', 'FP2' or 'FP3'",
        true,
    )
}

fn driver_identifier() -> ToolParameter {
    param(
        "driver_identifier",
        ParamType::String,
        "Three-letter driver code or car number, e.g. 'VER'",
        true,
    )
}
