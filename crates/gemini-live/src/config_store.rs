//! The session configuration shared by every consumer.
//!
//! The endpoint accepts exactly one `setup` frame per connection, so the store
//! keeps two configs: the *working* config that consumers keep merging into,
//! and the *active* config, a frozen snapshot of what was actually sent for
//! the current connection.

use gemini_live_types::{Content, GenerationConfig, Setup, Tool, ToolDeclaration};
use std::sync::Arc;
use tracing::{debug, warn};

/// Model, instructions and tool declarations for one connection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LiveConfig {
    pub model: String,
    pub system_instruction: Option<String>,
    pub generation_config: Option<GenerationConfig>,
    /// Unique by name, in first-declared order.
    pub tool_declarations: Vec<ToolDeclaration>,
}

impl LiveConfig {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Default::default()
        }
    }

    pub fn with_system_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.system_instruction = Some(instruction.into());
        self
    }

    pub fn with_generation_config(mut self, generation_config: GenerationConfig) -> Self {
        self.generation_config = Some(generation_config);
        self
    }

    pub fn with_tool(mut self, declaration: ToolDeclaration) -> Self {
        self.tool_declarations.push(declaration);
        self
    }

    pub fn declaration(&self, name: &str) -> Option<&ToolDeclaration> {
        self.tool_declarations.iter().find(|d| d.name == name)
    }

    /// The `setup` frame body for this config.
    pub fn to_setup(&self) -> Setup {
        let tools = if self.tool_declarations.is_empty() {
            Vec::new()
        } else {
            vec![Tool {
                function_declarations: self.tool_declarations.clone(),
            }]
        };
        Setup {
            model: self.model.clone(),
            generation_config: self.generation_config.clone(),
            system_instruction: self.system_instruction.as_ref().map(|text| Content {
                role: None,
                parts: vec![gemini_live_types::Part::text(text.clone())],
            }),
            tools,
        }
    }

    /// Merges `declarations` by name. An existing declaration with the same
    /// name is replaced in place; the replaced names are returned.
    fn merge_declarations(&mut self, declarations: Vec<ToolDeclaration>) -> Vec<String> {
        let mut collisions = Vec::new();
        for declaration in declarations {
            match self
                .tool_declarations
                .iter_mut()
                .find(|d| d.name == declaration.name)
            {
                Some(existing) => {
                    collisions.push(declaration.name.clone());
                    *existing = declaration;
                }
                None => self.tool_declarations.push(declaration),
            }
        }
        collisions
    }
}

/// What a `set_config` call did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[must_use]
pub struct SetConfigOutcome {
    /// Tool names that were already declared and have been replaced.
    pub collisions: Vec<String>,
    /// True when a connection is live: the change applies from the next connection.
    pub staged: bool,
}

#[derive(Debug, Default)]
pub struct ConfigStore {
    working: Option<LiveConfig>,
    active: Option<Arc<LiveConfig>>,
}

impl ConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges `config` into the working config.
    ///
    /// Non-empty `model` and any present instruction or generation settings
    /// overwrite the previous values; declarations merge by name, last writer
    /// wins. `live` must be true while a connection is open or opening.
    pub fn set_config(&mut self, config: LiveConfig, live: bool) -> SetConfigOutcome {
        let LiveConfig {
            model,
            system_instruction,
            generation_config,
            tool_declarations,
        } = config;

        let working = self.working.get_or_insert_with(LiveConfig::default);
        if !model.is_empty() {
            working.model = model;
        }
        if system_instruction.is_some() {
            working.system_instruction = system_instruction;
        }
        if generation_config.is_some() {
            working.generation_config = generation_config;
        }
        let collisions = working.merge_declarations(tool_declarations);
        self.outcome(collisions, live)
    }

    /// Merges tool declarations only, leaving model and instructions untouched.
    pub fn add_declarations(
        &mut self,
        declarations: Vec<ToolDeclaration>,
        live: bool,
    ) -> SetConfigOutcome {
        let collisions = self
            .working
            .get_or_insert_with(LiveConfig::default)
            .merge_declarations(declarations);
        self.outcome(collisions, live)
    }

    /// Drops a declaration from the working config. Returns whether it existed.
    pub fn remove_declaration(&mut self, name: &str, live: bool) -> bool {
        let Some(working) = self.working.as_mut() else {
            return false;
        };
        let before = working.tool_declarations.len();
        working.tool_declarations.retain(|d| d.name != name);
        let removed = working.tool_declarations.len() != before;
        if removed && live {
            debug!(tool = %name, "Declaration removal staged for the next connection");
        }
        removed
    }

    /// A frozen copy of the working config, not yet active.
    ///
    /// Returns `None` when no model has been configured yet.
    pub fn snapshot(&self) -> Option<Arc<LiveConfig>> {
        let working = self.working.as_ref().filter(|c| !c.model.is_empty())?;
        Some(Arc::new(working.clone()))
    }

    /// Marks `config` as the one sent for the current connection.
    pub fn activate(&mut self, config: Arc<LiveConfig>) {
        self.active = Some(config);
    }

    /// [`snapshot`](Self::snapshot) and [`activate`](Self::activate) in one step.
    pub fn freeze(&mut self) -> Option<Arc<LiveConfig>> {
        let frozen = self.snapshot()?;
        self.activate(frozen.clone());
        Some(frozen)
    }

    /// The config sent for the current connection, if any.
    pub fn active_config(&self) -> Option<Arc<LiveConfig>> {
        self.active.clone()
    }

    /// The config the next connection will send.
    pub fn working_config(&self) -> Option<&LiveConfig> {
        self.working.as_ref()
    }

    /// True when the working config differs from what the live connection was set up with.
    pub fn has_staged_changes(&self) -> bool {
        match (&self.active, &self.working) {
            (Some(active), Some(working)) => **active != *working,
            _ => false,
        }
    }

    pub fn clear_active(&mut self) {
        self.active = None;
    }

    fn outcome(&self, collisions: Vec<String>, live: bool) -> SetConfigOutcome {
        for name in &collisions {
            warn!(tool = %name, "Tool declared twice; the later declaration replaces the earlier one");
        }
        let staged = live;
        if staged {
            debug!("Session is live; config change staged for the next connection");
        }
        SetConfigOutcome { collisions, staged }
    }
}
