//! Declarative screen layouts.
//!
//! A layout file is KDL with one element tree and an optional `styles` node:
//!
//! ```kdl
//! Container "Login" {
//!     Text "Title" value="Login"
//!     Input "Username"
//! }
//! styles {
//!     Title {
//!         X "50%"
//!         Origin "CenterX"
//!     }
//! }
//! ```
//!
//! Node names are element types, the first argument is the class. Each class
//! under `styles` becomes a style block in the text grammar.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::Path;

use kdl::{KdlDocument, KdlNode, KdlValue};

use super::element::{ElementSpec, ElementType, Events, Shape};
use super::ElementKind;
use crate::error::{ClientError, Result};

/// Caller-supplied overrides for an element class.
#[derive(Default)]
pub struct ElementConfig {
    pub value: Option<String>,
    pub style: Option<String>,
    pub hidden: Option<bool>,
    pub events: Events,
}

impl ElementConfig {
    pub fn events(events: Events) -> Self {
        Self {
            events,
            ..Default::default()
        }
    }

    pub fn value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn hidden(mut self, hidden: bool) -> Self {
        self.hidden = Some(hidden);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
struct LayoutNode {
    ty: ElementType,
    class: String,
    value: Option<String>,
    password: bool,
    focusable: Option<bool>,
    hidden: bool,
    ellipse: bool,
    image: Option<u32>,
    children: Vec<LayoutNode>,
}

/// A parsed layout file.
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutDoc {
    root: LayoutNode,
    styles: HashMap<String, String>,
}

fn value_text(v: &KdlValue) -> String {
    if let Some(s) = v.as_string() {
        s.to_string()
    } else if let Some(i) = v.as_integer() {
        i.to_string()
    } else if let Some(f) = v.as_float() {
        f.to_string()
    } else if let Some(b) = v.as_bool() {
        b.to_string()
    } else {
        String::new()
    }
}

fn positional(node: &KdlNode) -> impl Iterator<Item = &KdlValue> {
    node.entries()
        .iter()
        .filter(|e| e.name().is_none())
        .map(|e| e.value())
}

fn prop_bool(node: &KdlNode, key: &str) -> Option<bool> {
    node.get(key)?.as_bool()
}

fn parse_node(node: &KdlNode) -> Result<LayoutNode> {
    let ty: ElementType = node.name().value().parse()?;
    let class = node
        .get(0)
        .and_then(|v| v.as_string())
        .unwrap_or_default()
        .to_string();
    let children = match node.children() {
        Some(doc) => doc
            .nodes()
            .iter()
            .map(parse_node)
            .collect::<Result<Vec<_>>>()?,
        None => Vec::new(),
    };
    Ok(LayoutNode {
        ty,
        class,
        value: node.get("value").map(value_text),
        password: prop_bool(node, "password").unwrap_or(false),
        focusable: prop_bool(node, "focusable"),
        hidden: prop_bool(node, "hidden").unwrap_or(false),
        ellipse: node.get("shape").and_then(|v| v.as_string()) == Some("ellipse"),
        image: node
            .get("image")
            .and_then(|v| v.as_integer())
            .and_then(|i| u32::try_from(i).ok()),
        children,
    })
}

/// Convert a `styles` child into the style text grammar.
fn style_block(class_node: &KdlNode) -> String {
    let mut out = String::new();
    if let Some(props) = class_node.children() {
        for prop in props.nodes() {
            let args: Vec<String> = positional(prop).map(value_text).collect();
            let _ = writeln!(out, "{} {}", prop.name().value(), args.join(" "));
        }
    }
    out
}

impl LayoutDoc {
    pub fn parse(text: &str) -> Result<Self> {
        let doc: KdlDocument = text.parse()?;
        let mut root = None;
        let mut styles = HashMap::new();
        for node in doc.nodes() {
            if node.name().value() == "styles" {
                if let Some(classes) = node.children() {
                    for class_node in classes.nodes() {
                        styles.insert(class_node.name().value().to_string(), style_block(class_node));
                    }
                }
                continue;
            }
            if root.is_some() {
                return Err(ClientError::Layout(
                    "layout has more than one root element".into(),
                ));
            }
            root = Some(parse_node(node)?);
        }
        let root = root.ok_or_else(|| ClientError::Layout("layout has no root element".into()))?;
        Ok(Self { root, styles })
    }

    /// Load `ui/<screen>.kdl` from the share directory, falling back to the
    /// built-in copy when the file is missing or unreadable.
    pub fn load(share_dir: Option<&Path>, screen: &str) -> Result<Self> {
        if let Some(dir) = share_dir {
            let path = dir.join("ui").join(format!("{screen}.kdl"));
            match std::fs::read_to_string(&path) {
                Ok(text) => match Self::parse(&text) {
                    Ok(doc) => return Ok(doc),
                    Err(e) => log::warn!("failed to parse {}: {e}", path.display()),
                },
                Err(e) => log::debug!("no layout at {}: {e}", path.display()),
            }
        }
        let text = builtin(screen)
            .ok_or_else(|| ClientError::Layout(format!("no layout for screen {screen:?}")))?;
        Self::parse(text)
    }

    pub fn style_for(&self, class: &str) -> Option<&str> {
        self.styles.get(class).map(String::as_str)
    }

    /// Instantiate the tree, applying per-class styles and configs.
    pub fn generate(&self, mut configs: HashMap<String, ElementConfig>) -> ElementSpec {
        self.generate_node(&self.root, &mut configs)
    }

    fn generate_node(
        &self,
        node: &LayoutNode,
        configs: &mut HashMap<String, ElementConfig>,
    ) -> ElementSpec {
        let kind = match node.ty {
            ElementType::Input => ElementKind::Input {
                composition: Vec::new(),
                cursor: 0,
                password: node.password,
            },
            ElementType::Primitive if node.ellipse => ElementKind::Primitive {
                shape: Shape::Ellipse,
            },
            ElementType::Image => ElementKind::image(node.image.unwrap_or(0)),
            ty => ty.default_kind(),
        };
        let mut spec = ElementSpec::new(kind)
            .class(node.class.clone())
            .hidden(node.hidden);
        if let Some(style) = self.styles.get(&node.class) {
            spec = spec.style(style.clone());
        }
        if let Some(value) = &node.value {
            spec = spec.value(value.clone());
        }
        if let Some(f) = node.focusable {
            spec = spec.focusable(f);
        }
        if let Some(config) = configs.remove(&node.class) {
            if let Some(value) = config.value {
                spec = spec.value(value);
            }
            if let Some(style) = config.style {
                spec.style.push('\n');
                spec.style.push_str(&style);
            }
            if let Some(hidden) = config.hidden {
                spec = spec.hidden(hidden);
            }
            spec = spec.events(config.events);
        }
        for child in &node.children {
            spec = spec.child(self.generate_node(child, configs));
        }
        spec
    }
}

/// Built-in layouts compiled into the binary.
pub fn builtin(screen: &str) -> Option<&'static str> {
    Some(match screen {
        "list" => include_str!("../../share/chimera/client/ui/list.kdl"),
        "handshake" => include_str!("../../share/chimera/client/ui/handshake.kdl"),
        "login" => include_str!("../../share/chimera/client/ui/login.kdl"),
        "register" => include_str!("../../share/chimera/client/ui/register.kdl"),
        "character_selection" => {
            include_str!("../../share/chimera/client/ui/character_selection.kdl")
        }
        "character_creation" => {
            include_str!("../../share/chimera/client/ui/character_creation.kdl")
        }
        "game" => include_str!("../../share/chimera/client/ui/game.kdl"),
        _ => return None,
    })
}
