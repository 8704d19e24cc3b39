use std::collections::BTreeMap;

use crate::{
    markup::{Tag, ViewNode},
    schema::FieldRegistry,
    states::FieldState,
    value::{Record, Value},
    widget::{WidgetKind, resolve_widget},
};

/// Abstract row width a group distributes among its cells. Integer
/// division of this budget keeps widths exact for colspan sets that fill
/// the declared column count.
pub const ROW_WIDTH: u32 = 1000;

const DEFAULT_GROUP_COLUMNS: u32 = 4;

/// Identity of a node within one view tree: the child-index path from the
/// root. Transient UI state (active page, expanded sections) keys on this,
/// independent of any UI framework's widget instances.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct NodePath(pub Vec<usize>);

impl NodePath {
    fn child(&self, index: usize) -> Self {
        let mut path = self.0.clone();
        path.push(index);
        Self(path)
    }
}

/// Per-editor transient UI state, discarded with the editor.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct UiState {
    active_pages: BTreeMap<NodePath, usize>,
    expanded: BTreeMap<NodePath, bool>,
}

impl UiState {
    pub fn set_active_page(&mut self, path: NodePath, page: usize) {
        self.active_pages.insert(path, page);
    }

    pub fn set_expanded(&mut self, path: NodePath, expanded: bool) {
        self.expanded.insert(path, expanded);
    }

    fn active_page(&self, path: &NodePath) -> Option<usize> {
        self.active_pages.get(path).copied()
    }

    fn is_expanded(&self, path: &NodePath) -> Option<bool> {
        self.expanded.get(path).copied()
    }
}

/// The interpreter's output: everything a frontend needs to draw the view,
/// with all dynamic attributes already folded in.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RenderPlan {
    pub view_kind: Tag,
    pub title: Option<String>,
    pub units: Vec<RenderUnit>,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderUnit {
    Group(GroupUnit),
    Notebook(NotebookUnit),
    Expander(ExpanderUnit),
    Paned(PanedUnit),
    Field(FieldUnit),
    Button(ButtonUnit),
    Label(LabelUnit),
    Separator { label: Option<String> },
    Link { name: String, label: Option<String> },
    ImageRef { source: String },
    /// The view references a field the registry does not know. Rendered
    /// inline; siblings are unaffected.
    UnknownField { name: String },
    /// Forward-incompatible tag: a visible marker instead of an abort.
    UnknownTag { tag: String },
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct GroupUnit {
    pub columns: u32,
    pub rows: Vec<Vec<Cell>>,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Cell {
    /// Share of `ROW_WIDTH`, proportional to the child's colspan.
    pub width: u32,
    pub expand: bool,
    pub unit: RenderUnit,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct NotebookUnit {
    pub pages: Vec<PageUnit>,
    /// Index into `pages`; the first page unless UI state says otherwise.
    pub active: usize,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PageUnit {
    pub label: Option<String>,
    pub path: NodePath,
    pub units: Vec<RenderUnit>,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ExpanderUnit {
    pub label: Option<String>,
    pub path: NodePath,
    pub expanded: bool,
    pub units: Vec<RenderUnit>,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PanedUnit {
    pub horizontal: bool,
    pub panes: Vec<Vec<RenderUnit>>,
}

/// One editable field, fully resolved: widget chosen, dynamic state folded
/// in, current value attached. Edits route back through
/// `EditorSession::edit` keyed by `name`.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FieldUnit {
    pub name: String,
    pub label: String,
    pub widget: WidgetKind,
    pub value: Value,
    pub state: FieldState,
    /// Whether an edit of this field starts a recomputation cascade.
    pub triggers_cascade: bool,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ButtonUnit {
    pub name: String,
    pub label: Option<String>,
    /// Confirmation text; the host must gate the click behind it before
    /// dispatching the action.
    pub confirm: Option<String>,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct LabelUnit {
    pub text: String,
}

/// Walk the view tree and produce a render plan for the current record.
///
/// Total over well-formed trees: unknown tags and unknown fields become
/// inline markers, invisible fields vanish, and nothing here returns an
/// error.
#[tracing::instrument(skip_all, fields(view = ?view.tag))]
pub fn interpret(
    view: &ViewNode,
    registry: &FieldRegistry,
    record: &Record,
    ui: &UiState,
) -> RenderPlan {
    let ctx = Walk {
        registry,
        record,
        ui,
    };
    let root_readonly = attr_flag(view, "readonly").unwrap_or(false);
    let units = ctx.walk_children(view, &NodePath::default(), root_readonly);
    RenderPlan {
        view_kind: view.tag.clone(),
        title: view.attr("string").map(str::to_string),
        units,
    }
}

struct Walk<'a> {
    registry: &'a FieldRegistry,
    record: &'a Record,
    ui: &'a UiState,
}

impl Walk<'_> {
    fn walk_children(
        &self,
        node: &ViewNode,
        path: &NodePath,
        readonly: bool,
    ) -> Vec<RenderUnit> {
        node.children
            .iter()
            .enumerate()
            .filter_map(|(i, child)| self.walk(child, &path.child(i), readonly))
            .collect()
    }

    /// Dispatch on tag. `readonly` is the inherited flag: monotonic, once
    /// true no descendant can flip it back.
    fn walk(&self, node: &ViewNode, path: &NodePath, readonly: bool) -> Option<RenderUnit> {
        let readonly = readonly || attr_flag(node, "readonly").unwrap_or(false);
        match &node.tag {
            Tag::Group => Some(RenderUnit::Group(self.group(node, path, readonly))),
            Tag::Notebook => Some(RenderUnit::Notebook(self.notebook(node, path, readonly))),
            Tag::Expander => Some(RenderUnit::Expander(self.expander(node, path, readonly))),
            Tag::Paned => Some(RenderUnit::Paned(self.paned(node, path, readonly))),
            Tag::Field => self.field(node, readonly),
            Tag::Button => Some(RenderUnit::Button(ButtonUnit {
                name: node.attr("name").unwrap_or_default().to_string(),
                label: node.attr("string").map(str::to_string),
                confirm: node.attr("confirm").map(str::to_string),
            })),
            Tag::Label => Some(RenderUnit::Label(LabelUnit {
                text: self.label_text(node),
            })),
            Tag::Separator => Some(RenderUnit::Separator {
                label: node.attr("string").map(str::to_string),
            }),
            Tag::Link => Some(RenderUnit::Link {
                name: node.attr("name").unwrap_or_default().to_string(),
                label: node.attr("string").map(str::to_string),
            }),
            Tag::Image => Some(RenderUnit::ImageRef {
                source: node.attr("name").unwrap_or_default().to_string(),
            }),
            // A nested root-kind tag carries no layout of its own here;
            // its children still render.
            Tag::Form | Tag::Tree | Tag::Graph | Tag::Calendar | Tag::Board | Tag::Page => {
                Some(RenderUnit::Group(self.group(node, path, readonly)))
            }
            Tag::Other(tag) => Some(RenderUnit::UnknownTag { tag: tag.clone() }),
        }
    }

    /// Distribute the declared column budget across children, wrapping
    /// rows. Cell width is `ROW_WIDTH * colspan / col` by integer
    /// division; a nonzero colspan never yields width zero.
    fn group(&self, node: &ViewNode, path: &NodePath, readonly: bool) -> GroupUnit {
        let columns = node
            .attr("col")
            .and_then(|c| c.parse::<u32>().ok())
            .filter(|c| *c > 0)
            .unwrap_or(DEFAULT_GROUP_COLUMNS);

        let mut rows: Vec<Vec<Cell>> = Vec::new();
        let mut row: Vec<Cell> = Vec::new();
        let mut used = 0u32;

        for (i, child) in node.children.iter().enumerate() {
            let Some(unit) = self.walk(child, &path.child(i), readonly) else {
                continue; // invisible: occupies no cell
            };
            let colspan = child
                .attr("colspan")
                .and_then(|c| c.parse::<u32>().ok())
                .filter(|c| *c > 0)
                .unwrap_or(1)
                .min(columns);

            if used + colspan > columns && !row.is_empty() {
                rows.push(std::mem::take(&mut row));
                used = 0;
            }
            // Widen before multiplying: col/colspan come straight from the
            // markup and may be arbitrarily large.
            let width =
                ((u64::from(ROW_WIDTH) * u64::from(colspan) / u64::from(columns)) as u32).max(1);
            let expand = attr_flag(child, "xexpand").unwrap_or(false)
                || attr_flag(child, "yexpand").unwrap_or(false);
            row.push(Cell {
                width,
                expand,
                unit,
            });
            used += colspan;
        }
        if !row.is_empty() {
            rows.push(row);
        }

        GroupUnit { columns, rows }
    }

    fn notebook(&self, node: &ViewNode, path: &NodePath, readonly: bool) -> NotebookUnit {
        let mut pages = Vec::new();
        for (i, child) in node.children.iter().enumerate() {
            if child.tag != Tag::Page {
                continue;
            }
            let page_path = path.child(i);
            pages.push(PageUnit {
                label: child.attr("string").map(str::to_string),
                units: self.walk_children(child, &page_path, readonly),
                path: page_path,
            });
        }
        let active = self
            .ui
            .active_page(path)
            .filter(|p| *p < pages.len())
            .unwrap_or(0);
        NotebookUnit { pages, active }
    }

    fn expander(&self, node: &ViewNode, path: &NodePath, readonly: bool) -> ExpanderUnit {
        let expanded = self
            .ui
            .is_expanded(path)
            .or_else(|| attr_flag(node, "expand"))
            .unwrap_or(false);
        ExpanderUnit {
            label: node.attr("string").map(str::to_string),
            path: path.clone(),
            expanded,
            units: self.walk_children(node, path, readonly),
        }
    }

    fn paned(&self, node: &ViewNode, path: &NodePath, readonly: bool) -> PanedUnit {
        let horizontal = node.attr("orientation") != Some("vertical");
        let panes = node
            .children
            .iter()
            .enumerate()
            .map(|(i, child)| {
                // Each direct child subtree is one pane.
                self.walk(child, &path.child(i), readonly)
                    .into_iter()
                    .collect()
            })
            .collect();
        PanedUnit { horizontal, panes }
    }

    fn field(&self, node: &ViewNode, inherited_readonly: bool) -> Option<RenderUnit> {
        let name = node.attr("name").unwrap_or_default().to_string();
        let Some(descriptor) = self.registry.get(&name) else {
            return Some(RenderUnit::UnknownField { name });
        };

        // Node attributes override the descriptor's static flags, then the
        // evaluated states win for required/readonly/invisible.
        let mut effective = descriptor.clone();
        if let Some(required) = attr_flag(node, "required") {
            effective.required = required;
        }
        if let Some(readonly) = attr_flag(node, "readonly") {
            effective.readonly = readonly;
        }
        let mut state = FieldState::evaluate(&effective, self.record);
        // Monotonic: an ancestor's readonly cannot be undone here.
        state.readonly = state.readonly || inherited_readonly;
        if state.invisible {
            return None;
        }

        let label = node
            .attr("string")
            .map(str::to_string)
            .unwrap_or_else(|| descriptor.label.clone());
        let widget = resolve_widget(&descriptor.field_type, node.attr("widget"));
        let value = self
            .record
            .get(&name)
            .cloned()
            .unwrap_or(Value::Null);

        Some(RenderUnit::Field(FieldUnit {
            label,
            widget,
            value,
            state,
            triggers_cascade: !descriptor.on_change.is_empty()
                || self.registry.dependents_of(&name).next().is_some(),
            name,
        }))
    }

    fn label_text(&self, node: &ViewNode) -> String {
        if let Some(s) = node.attr("string") {
            return s.to_string();
        }
        if let Some(name) = node.attr("name")
            && let Some(d) = self.registry.get(name)
        {
            return d.label.clone();
        }
        node.text.clone().unwrap_or_default()
    }
}

fn attr_flag(node: &ViewNode, name: &str) -> Option<bool> {
    node.attr(name).map(|v| matches!(v, "1" | "true" | "True"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        markup::parse_view,
        schema::{FieldDescriptor, FieldType},
    };

    fn registry() -> FieldRegistry {
        [
            FieldDescriptor::new("quantity", FieldType::Integer)
                .label("Quantity")
                .required(true),
            FieldDescriptor::new("price", FieldType::Float).label("Price"),
            FieldDescriptor::new("secret", FieldType::Char).state("invisible", "true"),
            FieldDescriptor::new("state", FieldType::Selection).selection(vec![
                ("draft".into(), "Draft".into()),
                ("done".into(), "Done".into()),
            ]),
        ]
        .into_iter()
        .collect()
    }

    fn record() -> Record {
        [
            ("quantity".to_string(), Value::Int(5)),
            ("price".to_string(), Value::Float(10.0)),
            ("state".to_string(), Value::Text("draft".into())),
        ]
        .into_iter()
        .collect()
    }

    fn plan(markup: &str) -> RenderPlan {
        let view = parse_view(markup).unwrap();
        interpret(&view, &registry(), &record(), &UiState::default())
    }

    fn group_widths(unit: &RenderUnit) -> Vec<u32> {
        let RenderUnit::Group(g) = unit else {
            panic!("expected group");
        };
        g.rows.iter().flatten().map(|c| c.width).collect()
    }

    #[test]
    fn group_distributes_column_budget_by_colspan() {
        let p = plan(
            r#"<form><group col="4">
                 <field name="quantity" colspan="1"/>
                 <field name="price" colspan="2"/>
                 <field name="state" colspan="1"/>
               </group></form>"#,
        );
        let widths = group_widths(&p.units[0]);
        assert_eq!(widths, vec![250, 500, 250]);
        assert_eq!(widths.iter().sum::<u32>(), ROW_WIDTH);
        assert!(widths.iter().all(|w| *w > 0));
    }

    #[test]
    fn group_wraps_rows_at_the_column_budget() {
        let p = plan(
            r#"<form><group col="2">
                 <field name="quantity"/>
                 <field name="price"/>
                 <field name="state"/>
               </group></form>"#,
        );
        let RenderUnit::Group(g) = &p.units[0] else {
            panic!("expected group");
        };
        assert_eq!(g.rows.len(), 2);
        assert_eq!(g.rows[0].len(), 2);
        assert_eq!(g.rows[1].len(), 1);
    }

    #[test]
    fn absurd_column_counts_do_not_overflow_width_arithmetic() {
        let p = plan(
            r#"<form><group col="4294968">
                 <field name="quantity" colspan="4294968"/>
                 <field name="price"/>
               </group></form>"#,
        );
        let widths = group_widths(&p.units[0]);
        assert_eq!(widths.len(), 2);
        assert!(widths.iter().all(|w| *w >= 1));
        assert_eq!(widths[0], ROW_WIDTH);
    }

    #[test]
    fn invisible_field_is_skipped_entirely() {
        let p = plan(r#"<form><group col="2"><field name="secret"/><field name="price"/></group></form>"#);
        let RenderUnit::Group(g) = &p.units[0] else {
            panic!("expected group");
        };
        let cells: Vec<_> = g.rows.iter().flatten().collect();
        assert_eq!(cells.len(), 1);
        let RenderUnit::Field(f) = &cells[0].unit else {
            panic!("expected field");
        };
        assert_eq!(f.name, "price");
    }

    #[test]
    fn unknown_field_renders_inline_marker_and_siblings_survive() {
        let p = plan(r#"<form><group><field name="ghost"/><field name="price"/></group></form>"#);
        let RenderUnit::Group(g) = &p.units[0] else {
            panic!("expected group");
        };
        let cells: Vec<_> = g.rows.iter().flatten().collect();
        assert_eq!(cells.len(), 2);
        assert!(matches!(
            &cells[0].unit,
            RenderUnit::UnknownField { name } if name == "ghost"
        ));
        assert!(matches!(&cells[1].unit, RenderUnit::Field(_)));
    }

    #[test]
    fn unknown_tag_becomes_visible_marker() {
        let p = plan(r#"<form><hologram name="x"/></form>"#);
        assert!(matches!(
            &p.units[0],
            RenderUnit::UnknownTag { tag } if tag == "hologram"
        ));
    }

    #[test]
    fn readonly_is_monotonic_down_the_tree() {
        let p = plan(
            r#"<form><group readonly="1">
                 <field name="price" readonly="0"/>
               </group></form>"#,
        );
        let RenderUnit::Group(g) = &p.units[0] else {
            panic!("expected group");
        };
        let RenderUnit::Field(f) = &g.rows[0][0].unit else {
            panic!("expected field");
        };
        assert!(f.state.readonly);
    }

    #[test]
    fn node_attrs_override_descriptor_statics() {
        let p = plan(r#"<form><field name="price" required="1" string="Unit Price"/></form>"#);
        let RenderUnit::Field(f) = &p.units[0] else {
            panic!("expected field");
        };
        assert!(f.state.required);
        assert_eq!(f.label, "Unit Price");
    }

    #[test]
    fn widget_override_is_honored() {
        let p = plan(r#"<form><field name="price" widget="progressbar"/></form>"#);
        let RenderUnit::Field(f) = &p.units[0] else {
            panic!("expected field");
        };
        assert_eq!(f.widget, WidgetKind::ProgressBar);
    }

    #[test]
    fn notebook_collects_pages_first_active_by_default() {
        let p = plan(
            r#"<form><notebook>
                 <page string="Main"><field name="quantity"/></page>
                 <page string="Extra"><field name="price"/></page>
               </notebook></form>"#,
        );
        let RenderUnit::Notebook(nb) = &p.units[0] else {
            panic!("expected notebook");
        };
        assert_eq!(nb.pages.len(), 2);
        assert_eq!(nb.active, 0);
        assert_eq!(nb.pages[1].label.as_deref(), Some("Extra"));
    }

    #[test]
    fn notebook_active_page_comes_from_ui_state() {
        let view = parse_view(
            r#"<form><notebook>
                 <page string="a"/><page string="b"/>
               </notebook></form>"#,
        )
        .unwrap();
        let mut ui = UiState::default();
        ui.set_active_page(NodePath(vec![0]), 1);
        let p = interpret(&view, &registry(), &record(), &ui);
        let RenderUnit::Notebook(nb) = &p.units[0] else {
            panic!("expected notebook");
        };
        assert_eq!(nb.active, 1);

        // Out-of-range state falls back to the first page.
        ui.set_active_page(NodePath(vec![0]), 9);
        let p = interpret(&view, &registry(), &record(), &ui);
        let RenderUnit::Notebook(nb) = &p.units[0] else {
            panic!("expected notebook");
        };
        assert_eq!(nb.active, 0);
    }

    #[test]
    fn button_confirmation_is_carried() {
        let p = plan(r#"<form><button name="post" string="Post" confirm="Really post?"/></form>"#);
        let RenderUnit::Button(b) = &p.units[0] else {
            panic!("expected button");
        };
        assert_eq!(b.confirm.as_deref(), Some("Really post?"));
    }

    #[test]
    fn label_falls_back_to_descriptor_then_text() {
        let p = plan(r#"<form><label name="price"/><label>freeform</label></form>"#);
        assert_eq!(
            p.units[0],
            RenderUnit::Label(LabelUnit {
                text: "Price".into()
            })
        );
        assert_eq!(
            p.units[1],
            RenderUnit::Label(LabelUnit {
                text: "freeform".into()
            })
        );
    }

    #[test]
    fn expander_state_keys_on_node_path() {
        let view =
            parse_view(r#"<form><expander string="More"><field name="price"/></expander></form>"#)
                .unwrap();
        let mut ui = UiState::default();
        let p = interpret(&view, &registry(), &record(), &ui);
        let RenderUnit::Expander(e) = &p.units[0] else {
            panic!("expected expander");
        };
        assert!(!e.expanded);

        ui.set_expanded(e.path.clone(), true);
        let p = interpret(&view, &registry(), &record(), &ui);
        let RenderUnit::Expander(e) = &p.units[0] else {
            panic!("expected expander");
        };
        assert!(e.expanded);
    }
}
