use serde::{Deserialize, Serialize};

use crate::transport::{CommandId, Tracer};

/// How the runtime reached a node when the line was emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogMode {
    Tick,
    Breaked,
    Continue,
    Jump,
    Return,
    Log,
}

/// Outcome attached to an enter/exit action line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionResult {
    None,
    Success,
    Failure,
    All,
}

/// Who emitted a line: `Class#Instance`, with `.` in the names written as
/// `::` the way the observer expects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentName {
    pub class: String,
    pub instance: String,
}

impl AgentName {
    pub fn new(class: &str, instance: &str) -> Self {
        Self {
            class: class.replace('.', "::"),
            instance: instance.replace('.', "::"),
        }
    }
}

impl std::fmt::Display for AgentName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.class, self.instance)
    }
}

fn result_label(result: ActionResult, mode: LogMode) -> &'static str {
    match result {
        ActionResult::Success => "success",
        ActionResult::Failure => "failure",
        ActionResult::All => "all",
        // An update tick with no result yet is still running.
        ActionResult::None if mode == LogMode::Tick => "running",
        ActionResult::None => "none",
    }
}

/// `[tick]Ship#Ship_1 ships\suicide.xml.Selector[1]:enter [success] [1]`
///
/// `count` is how many times the node was hit; only `tick`, `breaked` and
/// `continue` lines carry it together with the result. Returns `None` for
/// `LogMode::Log`, which is not an action mode.
pub fn action_line(agent: &AgentName, node: &str, result: ActionResult, mode: LogMode, count: u32) -> Option<String> {
    let label = result_label(result, mode);
    let line = match mode {
        LogMode::Tick => format!("[tick]{} {} [{}] [{}]\n", agent, node, label, count),
        LogMode::Breaked => format!("[breaked]{} {} [{}] [{}]\n", agent, node, label, count),
        LogMode::Continue => format!("[continue]{} {} [{}] [{}]\n", agent, node, label, count),
        LogMode::Jump => format!("[jump]{} {}\n", agent, node),
        LogMode::Return => format!("[return]{} {}\n", agent, node),
        LogMode::Log => return None,
    };
    Some(line)
}

/// `[property]Ship#Ship_1 GameObject::HP->100`
pub fn property_line(agent: &AgentName, variable: &str, value: &str) -> String {
    format!("[property]{} {}->{}\n", agent, variable, value)
}

/// `[profiler]ships\suicide.xml.BehaviorTree[0] 31`
pub fn profiler_line(tree: Option<&str>, node: &str, micros: u64) -> String {
    format!("[profiler]{}.xml.{} {}\n", tree.unwrap_or("None"), node, micros)
}

/// Application log line. An empty filter is sent as `empty`. `Jump` and
/// `Return` have no app-log form.
pub fn app_log_line(mode: LogMode, filter: &str, message: &str) -> Option<String> {
    let filter = if filter.is_empty() { "empty" } else { filter };
    match mode {
        LogMode::Tick => Some(format!("[applog]{}:{}\n", filter, message)),
        LogMode::Continue => Some(format!("[continue][applog]{}:{}\n", filter, message)),
        LogMode::Breaked => Some(format!("[breaked][applog]{}:{}\n", filter, message)),
        LogMode::Log => Some(format!("[log]{}:{}\n", filter, message)),
        LogMode::Jump | LogMode::Return => None,
    }
}

/// Sends formatted trace lines over a `Tracer`.
#[derive(Clone)]
pub struct TraceWriter {
    tracer: Tracer,
}

impl TraceWriter {
    pub fn new(tracer: Tracer) -> Self {
        Self { tracer }
    }

    pub fn action(&self, agent: &AgentName, node: &str, result: ActionResult, mode: LogMode, count: u32) {
        if let Some(line) = action_line(agent, node, result, mode, count) {
            self.tracer.send_text(&line, CommandId::TEXT);
        }
    }

    pub fn property(&self, agent: &AgentName, variable: &str, value: &str) {
        self.tracer.send_text(&property_line(agent, variable, value), CommandId::PROPERTY);
    }

    pub fn profiler(&self, tree: Option<&str>, node: &str, micros: u64) {
        self.tracer.send_text(&profiler_line(tree, node, micros), CommandId::TEXT);
    }

    pub fn app_log(&self, mode: LogMode, filter: &str, message: &str) {
        if let Some(line) = app_log_line(mode, filter, message) {
            self.tracer.send_text(&line, CommandId::TEXT);
        }
    }

    pub fn warning(&self, message: &str) {
        self.app_log(LogMode::Log, "warning", message);
    }

    pub fn error(&self, message: &str) {
        self.app_log(LogMode::Log, "error", message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_without_result_is_running() {
        let agent = AgentName::new("Ship", "Ship_1");
        let line = action_line(&agent, "suicide.xml.Selector[1]:update", ActionResult::None, LogMode::Tick, 1).unwrap();
        assert_eq!(line, "[tick]Ship#Ship_1 suicide.xml.Selector[1]:update [running] [1]\n");
    }

    #[test]
    fn jump_has_no_result_or_count() {
        let agent = AgentName::new("Ship", "Ship_1");
        let line = action_line(&agent, "bt.xml", ActionResult::Success, LogMode::Jump, 4).unwrap();
        assert_eq!(line, "[jump]Ship#Ship_1 bt.xml\n");
        assert!(action_line(&agent, "bt.xml", ActionResult::Success, LogMode::Log, 4).is_none());
    }

    #[test]
    fn dotted_names_become_scoped() {
        let agent = AgentName::new("Game.Ship", "fleet.Ship_1");
        assert_eq!(property_line(&agent, "HP", "100"), "[property]Game::Ship#fleet::Ship_1 HP->100\n");
    }

    #[test]
    fn empty_filter_is_named() {
        assert_eq!(app_log_line(LogMode::Log, "", "door opened").unwrap(), "[log]empty:door opened\n");
        assert_eq!(
            app_log_line(LogMode::Breaked, "door", "opened").unwrap(),
            "[breaked][applog]door:opened\n"
        );
        assert!(app_log_line(LogMode::Jump, "door", "opened").is_none());
    }
}
