use log::warn;

use crate::config::{Action, MenuConfig, MenuNode};
use crate::tray::commands::{ActionsMap, MAX_ACTIONS};
use crate::tray::menu::MenuItem;

/// Lays out the configured tree as menu items, tagging actions from `base_cmd`
/// upwards in menu order. Top-level action lists render inline; each section
/// becomes a submenu.
pub fn build_actions(config: &MenuConfig, base_cmd: u16) -> (Vec<MenuItem>, ActionsMap) {
    let mut items = Vec::new();
    let mut actions = ActionsMap::new();
    let mut next_cmd = base_cmd;

    let mut tag = |action: &Action| -> Option<MenuItem> {
        if actions.len() >= MAX_ACTIONS {
            return None;
        }
        actions.insert(next_cmd, action.command.clone());
        let item = MenuItem::Action {
            id: next_cmd,
            title: action.name.clone(),
        };
        next_cmd += 1;
        Some(item)
    };

    for node in &config.data {
        match node {
            MenuNode::Actions(list) => items.extend(list.iter().filter_map(&mut tag)),
            MenuNode::Sections(sections) => {
                for section in sections {
                    let sub = section.actions.iter().filter_map(&mut tag).collect();
                    items.push(MenuItem::Submenu {
                        title: section.name.clone(),
                        items: sub,
                    });
                }
            }
        }
    }

    let total = config.iter_actions().count();
    if total > MAX_ACTIONS {
        warn!("menu shows the first {MAX_ACTIONS} of {total} actions");
    }

    (items, actions)
}
