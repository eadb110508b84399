use std::{
    env,
    fs::{self, OpenOptions},
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
};

use anyhow::{anyhow, bail, Context, Result};
use serde::{
    de::Error as _,
    ser::SerializeMap,
    Deserialize, Deserializer, Serialize, Serializer,
};
use serde_json::Value;

pub const CONFIG_FILE_NAME: &str = ".mbsc.json";

/// Terminal used when the document does not name one.
pub const DEFAULT_TERMINAL: &str = "Terminal";

/// Seeded to the user path on first run.
pub const DEFAULT_TEMPLATE: &str = include_str!("../assets/default_config.json");

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    pub name: String,
    /// Shell command line, passed through to the terminal untouched.
    pub command: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub name: String,
    pub actions: Vec<Action>,
}

/// One entry of the top-level `data` array.
///
/// An entry that carries neither an action list nor a usable section list
/// decodes to an empty `Actions` node, which renders nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MenuNode {
    Actions(Vec<Action>),
    Sections(Vec<Section>),
}

impl MenuNode {
    pub fn is_empty(&self) -> bool {
        match self {
            MenuNode::Actions(actions) => actions.is_empty(),
            MenuNode::Sections(sections) => sections.is_empty(),
        }
    }
}

#[derive(Deserialize)]
struct RawNode {
    #[serde(default)]
    actions: Option<Value>,
    // Older config files used the singular key.
    #[serde(default)]
    action: Option<Value>,
    #[serde(default)]
    section: Option<Value>,
}

impl<'de> Deserialize<'de> for MenuNode {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = RawNode::deserialize(deserializer)?;

        // `actions` wins over `action`; the loser is never looked at.
        if let Some(list) = raw.actions.or(raw.action) {
            let actions = Vec::<Action>::deserialize(list).map_err(D::Error::custom)?;
            return Ok(MenuNode::Actions(actions));
        }

        // A malformed section list degrades to an empty node instead of failing the document.
        let sections = raw
            .section
            .and_then(|v| Vec::<Section>::deserialize(v).ok());
        Ok(match sections {
            Some(sections) => MenuNode::Sections(sections),
            None => MenuNode::Actions(Vec::new()),
        })
    }
}

impl Serialize for MenuNode {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(1))?;
        match self {
            MenuNode::Actions(actions) => map.serialize_entry("actions", actions)?,
            MenuNode::Sections(sections) => map.serialize_entry("section", sections)?,
        }
        map.end()
    }
}

/// The parsed configuration document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MenuConfig {
    pub terminal: String,
    pub data: Vec<MenuNode>,
}

impl Default for MenuConfig {
    fn default() -> Self {
        Self {
            terminal: DEFAULT_TERMINAL.to_string(),
            data: Vec::new(),
        }
    }
}

impl MenuConfig {
    /// Every action in menu order, paired with the name of its section (if any).
    pub fn iter_actions(&self) -> impl Iterator<Item = (Option<&str>, &Action)> {
        self.data.iter().flat_map(node_actions)
    }

    /// Looks up an action by `name` or by `section/name`. First match in menu order wins.
    pub fn find_action(&self, query: &str) -> Option<&Action> {
        if let Some(found) = self
            .iter_actions()
            .find(|(_, action)| action.name == query)
            .map(|(_, action)| action)
        {
            return Some(found);
        }

        let (section, name) = query.split_once('/')?;
        self.iter_actions()
            .find(|(s, action)| *s == Some(section) && action.name == name)
            .map(|(_, action)| action)
    }
}

fn node_actions(node: &MenuNode) -> Box<dyn Iterator<Item = (Option<&str>, &Action)> + '_> {
    match node {
        MenuNode::Actions(actions) => Box::new(actions.iter().map(|a| (None, a))),
        MenuNode::Sections(sections) => Box::new(sections.iter().flat_map(|s| {
            s.actions.iter().map(move |a| (Some(s.name.as_str()), a))
        })),
    }
}

/// Parses a configuration document.
///
/// The root must be an object with a `data` array. `terminal` is optional and
/// falls back to [`DEFAULT_TERMINAL`] when missing or not a string. Any entry
/// with a malformed action list fails the whole document.
pub fn parse_document(bytes: &[u8]) -> Result<MenuConfig> {
    let root: Value = serde_json::from_slice(bytes).context("config is not valid JSON")?;
    let obj = root
        .as_object()
        .ok_or_else(|| anyhow!("config root must be a JSON object"))?;

    let terminal = match obj.get("terminal") {
        Some(Value::String(name)) => name.clone(),
        _ => DEFAULT_TERMINAL.to_string(),
    };

    let Some(entries) = obj.get("data") else {
        bail!("config is missing the `data` array");
    };
    let entries = entries
        .as_array()
        .ok_or_else(|| anyhow!("`data` must be an array"))?;

    let data = entries
        .iter()
        .enumerate()
        .map(|(i, entry)| {
            MenuNode::deserialize(entry).with_context(|| format!("decoding data[{i}]"))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(MenuConfig { terminal, data })
}

pub fn load(path: &Path) -> Result<MenuConfig> {
    let bytes = fs::read(path).with_context(|| format!("reading config {}", path.display()))?;
    parse_document(&bytes).with_context(|| format!("parsing {}", path.display()))
}

/// Result of [`check`]: the parsed document plus entries that render nothing.
#[derive(Debug, Clone)]
pub struct CheckReport {
    pub config: MenuConfig,
    pub empty_entries: Vec<usize>,
}

/// Parses `path` and reports the first problem instead of keeping an older tree.
pub fn check(path: &Path) -> Result<CheckReport> {
    let config = load(path)?;
    let empty_entries = config
        .data
        .iter()
        .enumerate()
        .filter(|(_, node)| node.is_empty())
        .map(|(i, _)| i)
        .collect();
    Ok(CheckReport {
        config,
        empty_entries,
    })
}

/// `<home>/.mbsc.json`, or `None` when `HOME` is unset.
pub fn resolve_config_path() -> Option<PathBuf> {
    let home = env::var_os("HOME")?;
    if home.is_empty() {
        return None;
    }
    Some(PathBuf::from(home).join(CONFIG_FILE_NAME))
}

/// Writes `template` to `path` unless a file is already there.
///
/// Returns `true` when the file was seeded by this call.
pub fn ensure_config_file_exists(path: &Path, template: Option<&str>) -> Result<bool> {
    if path.exists() {
        return Ok(false);
    }

    let Some(template) = template else {
        bail!("no bundled config template to seed {}", path.display());
    };

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create config dir {}", parent.display()))?;
        }
    }

    let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(f) => f,
        // Lost a race with another writer; theirs stands.
        Err(e) if e.kind() == ErrorKind::AlreadyExists => return Ok(false),
        Err(e) => {
            return Err(e).with_context(|| format!("create {}", path.display()));
        }
    };
    file.write_all(template.as_bytes())
        .with_context(|| format!("write {}", path.display()))?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn action(name: &str, command: &str) -> Action {
        Action {
            name: name.to_string(),
            command: command.to_string(),
        }
    }

    #[test]
    fn parses_single_action_list() {
        let cfg = parse_document(
            br#"{"terminal":"iTerm","data":[{"actions":[{"name":"List","command":"ls -la"}]}]}"#,
        )
        .unwrap();
        assert_eq!(cfg.terminal, "iTerm");
        assert_eq!(cfg.data, vec![MenuNode::Actions(vec![action("List", "ls -la")])]);
    }

    #[test]
    fn legacy_action_key_matches_actions_key() {
        let legacy = parse_document(
            br#"{"data":[{"action":[{"name":"a","command":"echo a"},{"name":"b","command":"echo b"}]}]}"#,
        )
        .unwrap();
        let current = parse_document(
            br#"{"data":[{"actions":[{"name":"a","command":"echo a"},{"name":"b","command":"echo b"}]}]}"#,
        )
        .unwrap();
        assert_eq!(legacy, current);
    }

    #[test]
    fn actions_key_takes_precedence_over_action() {
        let cfg = parse_document(
            br#"{"data":[{"actions":[{"name":"new","command":"n"}],"action":"garbage"}]}"#,
        )
        .unwrap();
        assert_eq!(cfg.data, vec![MenuNode::Actions(vec![action("new", "n")])]);
    }

    #[test]
    fn missing_terminal_defaults() {
        let cfg = parse_document(br#"{"data":[]}"#).unwrap();
        assert_eq!(cfg.terminal, DEFAULT_TERMINAL);

        let cfg = parse_document(br#"{"terminal":42,"data":[]}"#).unwrap();
        assert_eq!(cfg.terminal, DEFAULT_TERMINAL);
    }

    #[test]
    fn preserves_entry_and_action_order() {
        let cfg = parse_document(
            br#"{
                "data": [
                    {"section": [
                        {"name": "Z", "actions": [{"name": "z2", "command": "2"}, {"name": "z1", "command": "1"}]},
                        {"name": "A", "actions": []}
                    ]},
                    {"actions": [{"name": "last", "command": "x"}]}
                ]
            }"#,
        )
        .unwrap();

        let MenuNode::Sections(sections) = &cfg.data[0] else {
            panic!("expected sections first");
        };
        assert_eq!(sections[0].name, "Z");
        assert_eq!(sections[1].name, "A");
        let names: Vec<_> = sections[0].actions.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, ["z2", "z1"]);
        assert!(matches!(&cfg.data[1], MenuNode::Actions(a) if a[0].name == "last"));
    }

    #[test]
    fn round_trips_through_serialization() {
        let cfg = MenuConfig {
            terminal: "WezTerm".to_string(),
            data: vec![
                MenuNode::Sections(vec![Section {
                    name: "Servers".to_string(),
                    actions: vec![action("web", "ssh web"), action("db", "ssh db")],
                }]),
                MenuNode::Actions(vec![action("quote", r#"echo "hi""#)]),
            ],
        };
        let json = serde_json::to_vec(&cfg).unwrap();
        assert_eq!(parse_document(&json).unwrap(), cfg);
    }

    #[test]
    fn entry_without_known_keys_is_empty() {
        let cfg = parse_document(br#"{"data":[{"unrelated":true}]}"#).unwrap();
        assert_eq!(cfg.data, vec![MenuNode::Actions(Vec::new())]);
        assert!(cfg.data[0].is_empty());
    }

    #[test]
    fn malformed_section_degrades_to_empty_node() {
        let cfg = parse_document(br#"{"data":[{"section":[{"name":"no actions"}]}]}"#).unwrap();
        assert_eq!(cfg.data, vec![MenuNode::Actions(Vec::new())]);
    }

    #[test]
    fn malformed_action_list_fails_document() {
        let err = parse_document(br#"{"data":[{"actions":[{"name":"x"}]}]}"#).unwrap_err();
        assert!(format!("{err:#}").contains("data[0]"));
    }

    #[test]
    fn rejects_wrong_root_shape() {
        assert!(parse_document(b"[]").is_err());
        assert!(parse_document(br#"{"terminal":"Terminal"}"#).is_err());
        assert!(parse_document(br#"{"data":{}}"#).is_err());
        assert!(parse_document(b"{not json").is_err());
    }

    #[test]
    fn find_action_by_name_or_section_path() {
        let cfg = parse_document(
            br#"{"data":[
                {"actions":[{"name":"top","command":"top"}]},
                {"section":[
                    {"name":"A","actions":[{"name":"deploy","command":"deploy a"}]},
                    {"name":"B","actions":[{"name":"deploy","command":"deploy b"}]}
                ]}
            ]}"#,
        )
        .unwrap();

        assert_eq!(cfg.find_action("top").unwrap().command, "top");
        assert_eq!(cfg.find_action("deploy").unwrap().command, "deploy a");
        assert_eq!(cfg.find_action("B/deploy").unwrap().command, "deploy b");
        assert!(cfg.find_action("C/deploy").is_none());
    }

    #[test]
    fn check_reports_empty_entries_and_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);

        fs::write(
            &path,
            r#"{"data":[{"actions":[{"name":"a","command":"b"}]},{},{"section":"bad"}]}"#,
        )
        .unwrap();
        let report = check(&path).unwrap();
        assert_eq!(report.config.data.len(), 3);
        assert_eq!(report.empty_entries, [1, 2]);

        fs::write(&path, r#"{"data":[{"actions":[{"name":"a"}]}]}"#).unwrap();
        let err = check(&path).unwrap_err();
        assert!(format!("{err:#}").contains("data[0]"));

        assert!(check(&dir.path().join("missing.json")).is_err());
    }

    #[test]
    fn bundled_template_parses() {
        let cfg = parse_document(DEFAULT_TEMPLATE.as_bytes()).unwrap();
        assert_eq!(cfg.terminal, DEFAULT_TERMINAL);
        assert!(cfg.iter_actions().count() > 0);
    }
}
