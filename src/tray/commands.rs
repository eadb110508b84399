use std::collections::BTreeMap;

pub const CMD_BASE_ACTION: u16 = 1000;
pub const CMD_RELOAD: u16 = 5000;
pub const CMD_QUIT: u16 = 5001;
pub const CMD_EDIT_CONFIG: u16 = 5003;

/// Highest number of configured actions that get a menu tag.
pub const MAX_ACTIONS: usize = (CMD_RELOAD - CMD_BASE_ACTION) as usize;

/// Menu tag -> command line.
pub type ActionsMap = BTreeMap<u16, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Run(u16),
    Reload,
    Quit,
    EditConfig,
}

pub fn decode(cmd_id: u16, actions: &ActionsMap) -> Option<Command> {
    if actions.contains_key(&cmd_id) {
        return Some(Command::Run(cmd_id));
    }

    match cmd_id {
        CMD_RELOAD => Some(Command::Reload),
        CMD_QUIT => Some(Command::Quit),
        CMD_EDIT_CONFIG => Some(Command::EditConfig),
        _ => None,
    }
}
