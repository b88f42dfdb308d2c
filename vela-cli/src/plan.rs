//! Execution plan: configuration compared with recorded state

use std::collections::{HashMap, HashSet};
use std::fmt::Write;

use colored::Colorize;
use similar::{ChangeTag, TextDiff};
use vela_core::differ::{self, Diff};
use vela_core::resource::{Resource, ResourceId, State, Value};
use vela_core::schema::ResourceSchema;
use vela_state::StateFile;

#[derive(Debug, Default)]
pub struct Plan {
    /// One entry per configured resource, in configuration order
    pub diffs: Vec<Diff>,
    /// Tracked resources that are no longer configured
    pub orphans: Vec<State>,
    /// Changed force-new attributes of each replaced resource
    pub replaced_by: HashMap<ResourceId, Vec<String>>,
}

impl Plan {
    /// Compare normalized resources with the recorded state
    pub fn build(
        desired: &[Resource],
        state: &StateFile,
        schema: impl Fn(&str) -> Option<ResourceSchema>,
    ) -> Result<Self, String> {
        let mut diffs = Vec::with_capacity(desired.len());
        let mut replaced_by = HashMap::new();
        for resource in desired {
            let schema = schema(&resource.id.resource_type)
                .ok_or_else(|| format!("{}: unknown resource type", resource.id))?;
            let diff = differ::diff(&schema, resource, &state.current(&resource.id));
            if let Diff::Replace {
                changed_attributes, ..
            } = &diff
            {
                let force_new = schema.force_new_attributes();
                let forcing = changed_attributes
                    .iter()
                    .filter(|a| force_new.contains(&a.as_str()))
                    .cloned()
                    .collect();
                replaced_by.insert(resource.id.clone(), forcing);
            }
            diffs.push(diff);
        }

        let configured: HashSet<&ResourceId> = desired.iter().map(|r| &r.id).collect();
        let orphans = state
            .resources
            .iter()
            .filter(|r| !configured.contains(&r.id()))
            .map(|r| r.to_state())
            .collect();

        Ok(Self {
            diffs,
            orphans,
            replaced_by,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.orphans.is_empty() && !self.diffs.iter().any(Diff::is_change)
    }

    pub fn summary(&self) -> (usize, usize, usize) {
        let mut add = 0;
        let mut change = 0;
        let mut destroy = self.orphans.len();
        for diff in &self.diffs {
            match diff {
                Diff::Create(_) => add += 1,
                Diff::Update { .. } => change += 1,
                Diff::Replace { .. } => {
                    add += 1;
                    destroy += 1;
                }
                Diff::NoChange(_) => {}
            }
        }
        (add, change, destroy)
    }
}

pub fn render(plan: &Plan) -> String {
    let mut out = String::new();
    if plan.is_empty() {
        let _ = writeln!(out, "{}", "No changes. Infrastructure is up-to-date.".green());
        return out;
    }

    let _ = writeln!(out, "{}", "Execution Plan:".cyan().bold());
    let _ = writeln!(out);

    for diff in &plan.diffs {
        match diff {
            Diff::Create(resource) => {
                let _ = writeln!(out, "  {} {}", "+".green().bold(), resource.id.to_string().cyan().bold());
                for key in sorted_keys(&resource.attributes) {
                    let _ = writeln!(
                        out,
                        "      {}: {}",
                        key,
                        format_value(&resource.attributes[key]).green()
                    );
                }
            }
            Diff::Update {
                id,
                from,
                to,
                changed_attributes,
            } => {
                let _ = writeln!(out, "  {} {}", "~".yellow().bold(), id.to_string().cyan().bold());
                render_changes(&mut out, from, to, changed_attributes, &[]);
            }
            Diff::Replace {
                from,
                to,
                changed_attributes,
            } => {
                let _ = writeln!(
                    out,
                    "  {} {} {}",
                    "-/+".magenta().bold(),
                    to.id.to_string().cyan().bold(),
                    "(replace)".magenta()
                );
                let forcing = plan.replaced_by.get(&to.id).map(Vec::as_slice).unwrap_or(&[]);
                render_changes(&mut out, from, to, changed_attributes, forcing);
            }
            Diff::NoChange(_) => {}
        }
    }

    for orphan in &plan.orphans {
        let _ = writeln!(
            out,
            "  {} {} {}",
            "-".red().bold(),
            orphan.id.to_string().cyan().bold(),
            "(no longer configured)".dimmed()
        );
    }

    let (add, change, destroy) = plan.summary();
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "Plan: {} to add, {} to change, {} to destroy.",
        add.to_string().green(),
        change.to_string().yellow(),
        destroy.to_string().red()
    );
    out
}

fn render_changes(
    out: &mut String,
    from: &State,
    to: &Resource,
    changed: &[String],
    force_new: &[String],
) {
    for key in changed {
        let before = from.attributes.get(key).unwrap_or(&Value::Null);
        let after = to.attributes.get(key).unwrap_or(&Value::Null);
        let marker = if force_new.contains(key) {
            format!(" {}", "# forces replacement".magenta())
        } else {
            String::new()
        };

        match (pretty_json(before), pretty_json(after)) {
            (Some(old), Some(new)) if old.contains('\n') || new.contains('\n') => {
                let _ = writeln!(out, "      {}:{}", key, marker);
                render_text_diff(out, &old, &new);
            }
            _ => {
                let _ = writeln!(
                    out,
                    "      {}: {} → {}{}",
                    key,
                    format_value(before).red(),
                    format_value(after).green(),
                    marker
                );
            }
        }
    }
}

/// Re-indent a JSON document held in a string attribute
fn pretty_json(value: &Value) -> Option<String> {
    let text = value.as_str()?;
    let parsed: serde_json::Value = serde_json::from_str(text).ok()?;
    if !(parsed.is_object() || parsed.is_array()) {
        return None;
    }
    serde_json::to_string_pretty(&parsed).ok()
}

fn render_text_diff(out: &mut String, old: &str, new: &str) {
    let diff = TextDiff::from_lines(old, new);
    for change in diff.iter_all_changes() {
        let line = change.value().trim_end_matches('\n');
        let _ = match change.tag() {
            ChangeTag::Delete => writeln!(out, "        {} {}", "-".red(), line.red()),
            ChangeTag::Insert => writeln!(out, "        {} {}", "+".green(), line.green()),
            ChangeTag::Equal => writeln!(out, "          {}", line),
        };
    }
}

fn sorted_keys(attributes: &HashMap<String, Value>) -> Vec<&String> {
    let mut keys: Vec<_> = attributes.keys().collect();
    keys.sort_by(|a, b| match (a.as_str(), b.as_str()) {
        ("name", _) => std::cmp::Ordering::Less,
        (_, "name") => std::cmp::Ordering::Greater,
        _ => a.cmp(b),
    });
    keys
}

pub fn format_value(value: &Value) -> String {
    match value {
        Value::String(s) => format!("{:?}", s),
        Value::Int(n) => n.to_string(),
        Value::UInt(n) => n.to_string(),
        Value::Float(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        Value::List(items) => {
            let strs: Vec<_> = items.iter().map(format_value).collect();
            format!("[{}]", strs.join(", "))
        }
        Value::Map(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            let strs: Vec<_> = entries
                .into_iter()
                .map(|(k, v)| format!("{}: {}", k, format_value(v)))
                .collect();
            format!("{{{}}}", strs.join(", "))
        }
    }
}

#[cfg(test)]
mod tests {
    use vela_core::schema::{AttributeSchema, AttributeType};
    use vela_state::ResourceState;

    use super::*;

    const TYPE: &str = "azurerm_impact_connectors";

    fn schema(resource_type: &str) -> Option<ResourceSchema> {
        (resource_type == TYPE).then(|| {
            ResourceSchema::new(TYPE)
                .attribute(AttributeSchema::new("name", AttributeType::String).required().force_new())
                .attribute(AttributeSchema::new("connector_type", AttributeType::String))
        })
    }

    fn connector(name: &str, connector_type: &str) -> Resource {
        Resource::new(TYPE, "main")
            .with_attribute("name", Value::String(name.to_string()))
            .with_attribute("connector_type", Value::String(connector_type.to_string()))
    }

    fn tracked(name: &str, connector_type: &str) -> StateFile {
        let mut file = StateFile::new();
        file.upsert_resource(
            ResourceState::new(TYPE, "main", "azurerm")
                .with_identifier(format!(
                    "/subscriptions/s/providers/Microsoft.Impact/connectors/{}",
                    name
                ))
                .with_attribute("name", serde_json::json!(name))
                .with_attribute("connector_type", serde_json::json!(connector_type)),
        );
        file
    }

    #[test]
    fn untracked_resource_is_created() {
        let plan = Plan::build(&[connector("c1", "AzureMonitor")], &StateFile::new(), schema).unwrap();
        assert!(matches!(plan.diffs[0], Diff::Create(_)));
        assert_eq!(plan.summary(), (1, 0, 0));
        assert!(render(&plan).contains("azurerm_impact_connectors.main"));
    }

    #[test]
    fn identical_resource_has_no_changes() {
        let plan = Plan::build(
            &[connector("c1", "AzureMonitor")],
            &tracked("c1", "AzureMonitor"),
            schema,
        )
        .unwrap();
        assert!(plan.is_empty());
        assert!(render(&plan).contains("No changes"));
    }

    #[test]
    fn mutable_change_is_an_update() {
        let plan = Plan::build(
            &[connector("c1", "AzureMonitor")],
            &tracked("c1", "Legacy"),
            schema,
        )
        .unwrap();
        match &plan.diffs[0] {
            Diff::Update {
                changed_attributes, ..
            } => assert_eq!(changed_attributes, &vec!["connector_type".to_string()]),
            other => panic!("expected update, got {:?}", other),
        }
        assert_eq!(plan.summary(), (0, 1, 0));
        assert!(render(&plan).contains("connector_type"));
    }

    #[test]
    fn force_new_change_is_a_replace() {
        let plan = Plan::build(
            &[connector("c2", "AzureMonitor")],
            &tracked("c1", "AzureMonitor"),
            schema,
        )
        .unwrap();
        assert!(matches!(plan.diffs[0], Diff::Replace { .. }));
        assert_eq!(plan.replaced_by[&ResourceId::new(TYPE, "main")], vec!["name".to_string()]);
        assert_eq!(plan.summary(), (1, 0, 1));
        assert!(render(&plan).contains("forces replacement"));
    }

    #[test]
    fn unconfigured_tracked_resource_is_an_orphan() {
        let plan = Plan::build(&[], &tracked("c1", "AzureMonitor"), schema).unwrap();
        assert_eq!(plan.orphans.len(), 1);
        assert_eq!(plan.summary(), (0, 0, 1));
        assert!(!plan.is_empty());
    }

    #[test]
    fn unknown_type_fails() {
        let resource = Resource::new("azurerm_other", "x");
        let err = Plan::build(&[resource], &StateFile::new(), schema).unwrap_err();
        assert!(err.contains("unknown resource type"));
    }

    #[test]
    fn json_attributes_render_as_line_diff() {
        let mut out = String::new();
        let from = State::existing(
            ResourceId::new(TYPE, "main"),
            HashMap::from([(
                "type_properties_json".to_string(),
                Value::String(r#"{"a":1,"b":2}"#.to_string()),
            )]),
        );
        let to = Resource::new(TYPE, "main").with_attribute(
            "type_properties_json",
            Value::String(r#"{"a":1,"b":3}"#.to_string()),
        );
        render_changes(&mut out, &from, &to, &["type_properties_json".to_string()], &[]);
        assert!(out.contains("\"b\": 2"));
        assert!(out.contains("\"b\": 3"));
        assert!(out.contains("\"a\": 1"));
    }

    #[test]
    fn format_values() {
        assert_eq!(format_value(&Value::String("x".to_string())), "\"x\"");
        assert_eq!(
            format_value(&Value::List(vec![Value::Int(1), Value::Bool(true)])),
            "[1, true]"
        );
        let map = Value::Map(HashMap::from([
            ("b".to_string(), Value::Null),
            ("a".to_string(), Value::Int(2)),
        ]));
        assert_eq!(format_value(&map), "{a: 2, b: null}");
        assert_eq!(format_value(&Value::UInt(u64::MAX)), "18446744073709551615");
    }
}
