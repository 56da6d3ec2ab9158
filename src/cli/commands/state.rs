use anyhow::{Context, Result};

use super::{CommandContext, Exit};
use crate::state::{StateStore, WorkflowKind, WorkflowState};

/// Prints the persisted state of a workflow.
pub struct StateShowCommand {
    kind: WorkflowKind,
}

impl StateShowCommand {
    pub fn new(kind: WorkflowKind) -> Self {
        Self { kind }
    }

    pub fn execute(&self, context: &CommandContext) -> Result<Exit> {
        let store = context.state_store(self.kind)?;
        if !store.exists() {
            println!("📭 No {} in progress ({})", self.kind, store.location());
            return Ok(Exit::Success);
        }
        let state = store.load()?;
        println!("📋 {} state at {}", self.kind, store.location());
        println!("{}", render(&state)?);
        Ok(Exit::Success)
    }
}

/// Deletes the persisted state of a workflow.
pub struct StateResetCommand {
    kind: WorkflowKind,
}

impl StateResetCommand {
    pub fn new(kind: WorkflowKind) -> Self {
        Self { kind }
    }

    pub fn execute(&self, context: &CommandContext) -> Result<Exit> {
        let store = context.state_store(self.kind)?;
        store.reset()?;
        println!("🧹 {} state at {} reset", self.kind, store.location());
        Ok(Exit::Success)
    }
}

fn render(state: &WorkflowState) -> Result<String> {
    serde_json::to_string_pretty(state).context("Cannot render workflow state")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RelengConfig;
    use crate::state::FileStateStore;

    fn context(dir: &std::path::Path) -> CommandContext {
        let mut config = RelengConfig::default();
        config.state.directory = Some(dir.to_path_buf());
        CommandContext::new(dir, config)
    }

    #[test]
    fn test_show_and_reset_persisted_state() {
        let temp = tempfile::tempdir().unwrap();
        let context = context(temp.path());
        let store = FileStateStore::new(context.config.state_path(WorkflowKind::Release).unwrap());
        store.save(&WorkflowState::at_step(5)).unwrap();

        assert_eq!(
            StateShowCommand::new(WorkflowKind::Release).execute(&context).unwrap(),
            Exit::Success
        );
        StateResetCommand::new(WorkflowKind::Release).execute(&context).unwrap();
        assert!(!store.exists());

        // Resetting twice is fine.
        StateResetCommand::new(WorkflowKind::Release).execute(&context).unwrap();
    }

    #[test]
    fn test_render_includes_step_and_values() {
        let mut state = WorkflowState::at_step(3);
        state.set("version", "2.1.0-baseline-20160504-130201").unwrap();
        let rendered = render(&state).unwrap();
        assert!(rendered.contains("\"current_step\": 3"));
        assert!(rendered.contains("2.1.0-baseline-20160504-130201"));
    }
}
