// src/dom/selector.rs

//! CSS-subset selectors.
//!
//! Supported grammar:
//! - groups separated by `,`
//! - compound steps made of `tag`, `*`, `#id`, `.class`, `[attr]`,
//!   `[attr=value]`, `[attr="value"]`
//! - descendant (whitespace) and child (`>`) combinators
//!
//! Pseudo-classes and sibling combinators are rejected at parse time so a bad
//! selector surfaces when a watcher is registered, not later in the async flow.

use std::fmt;
use std::str::FromStr;

use crate::dom::NodeId;
use crate::errors::{PagewatchError, Result};

/// Read access to a tree that selectors can be matched against.
pub trait SelectorTarget {
    fn tag_name(&self, node: NodeId) -> Option<&str>;
    fn attribute(&self, node: NodeId, key: &str) -> Option<&str>;
    fn parent_element(&self, node: NodeId) -> Option<NodeId>;
}

/// A parsed selector, keeping its source text for logs and errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    source: String,
    groups: Vec<Vec<SelectorPart>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum AttrCondition {
    Exists { key: String },
    Eq { key: String, value: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct SelectorStep {
    tag: Option<String>,
    universal: bool,
    id: Option<String>,
    classes: Vec<String>,
    attrs: Vec<AttrCondition>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Combinator {
    Descendant,
    Child,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct SelectorPart {
    step: SelectorStep,
    // Relation to the part on the left.
    combinator: Option<Combinator>,
}

impl Selector {
    pub fn parse(source: &str) -> Result<Self> {
        let trimmed = source.trim();
        if trimmed.is_empty() {
            return Err(PagewatchError::invalid_selector(source, "empty selector"));
        }

        let mut groups = Vec::new();
        for group in split_groups(trimmed)? {
            groups.push(parse_chain(trimmed, &group)?);
        }

        Ok(Self {
            source: trimmed.to_string(),
            groups,
        })
    }

    /// Selector matching every element with the given tag name.
    pub fn tag(name: &str) -> Self {
        let name = name.to_ascii_lowercase();
        Self {
            source: name.clone(),
            groups: vec![vec![SelectorPart {
                step: SelectorStep {
                    tag: Some(name),
                    ..SelectorStep::default()
                },
                combinator: None,
            }]],
        }
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Whether `node` matches any group of this selector.
    pub fn matches<T: SelectorTarget + ?Sized>(&self, tree: &T, node: NodeId) -> bool {
        if tree.tag_name(node).is_none() {
            return false;
        }
        self.groups.iter().any(|parts| matches_chain(tree, node, parts))
    }
}

impl FromStr for Selector {
    type Err = PagewatchError;

    fn from_str(s: &str) -> Result<Self> {
        Selector::parse(s)
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

fn matches_chain<T: SelectorTarget + ?Sized>(
    tree: &T,
    node: NodeId,
    parts: &[SelectorPart],
) -> bool {
    let Some(last) = parts.last() else {
        return false;
    };
    if !matches_step(tree, node, &last.step) {
        return false;
    }

    let mut current = node;
    for idx in (1..parts.len()).rev() {
        let left = &parts[idx - 1].step;
        let combinator = parts[idx].combinator.unwrap_or(Combinator::Descendant);

        let matched = match combinator {
            Combinator::Child => tree
                .parent_element(current)
                .filter(|parent| matches_step(tree, *parent, left)),
            Combinator::Descendant => {
                let mut cursor = tree.parent_element(current);
                let mut found = None;
                while let Some(parent) = cursor {
                    if matches_step(tree, parent, left) {
                        found = Some(parent);
                        break;
                    }
                    cursor = tree.parent_element(parent);
                }
                found
            }
        };

        let Some(matched) = matched else {
            return false;
        };
        current = matched;
    }

    true
}

fn matches_step<T: SelectorTarget + ?Sized>(tree: &T, node: NodeId, step: &SelectorStep) -> bool {
    let Some(tag) = tree.tag_name(node) else {
        return false;
    };

    if let Some(expected) = &step.tag {
        if !tag.eq_ignore_ascii_case(expected) {
            return false;
        }
    }

    if let Some(id) = &step.id {
        if tree.attribute(node, "id") != Some(id.as_str()) {
            return false;
        }
    }

    if !step.classes.is_empty() {
        let class_attr = tree.attribute(node, "class").unwrap_or("");
        let has_all = step
            .classes
            .iter()
            .all(|class| class_attr.split_ascii_whitespace().any(|c| c == class));
        if !has_all {
            return false;
        }
    }

    step.attrs.iter().all(|cond| match cond {
        AttrCondition::Exists { key } => tree.attribute(node, key).is_some(),
        AttrCondition::Eq { key, value } => tree.attribute(node, key) == Some(value.as_str()),
    })
}

fn split_groups(selector: &str) -> Result<Vec<String>> {
    let mut groups = Vec::new();
    let mut current = String::new();
    let mut bracket_depth = 0usize;

    for ch in selector.chars() {
        match ch {
            '[' => {
                bracket_depth += 1;
                current.push(ch);
            }
            ']' => {
                if bracket_depth == 0 {
                    return Err(PagewatchError::invalid_selector(selector, "unbalanced `]`"));
                }
                bracket_depth -= 1;
                current.push(ch);
            }
            ',' if bracket_depth == 0 => {
                let trimmed = current.trim();
                if trimmed.is_empty() {
                    return Err(PagewatchError::invalid_selector(selector, "empty selector group"));
                }
                groups.push(trimmed.to_string());
                current.clear();
            }
            _ => current.push(ch),
        }
    }

    if bracket_depth != 0 {
        return Err(PagewatchError::invalid_selector(selector, "unterminated `[`"));
    }

    let trimmed = current.trim();
    if trimmed.is_empty() {
        return Err(PagewatchError::invalid_selector(selector, "empty selector group"));
    }
    groups.push(trimmed.to_string());
    Ok(groups)
}

fn tokenize(source: &str, group: &str) -> Result<Vec<String>> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut bracket_depth = 0usize;

    for ch in group.chars() {
        if let Some(q) = quote {
            current.push(ch);
            if ch == q {
                quote = None;
            }
            continue;
        }
        match ch {
            '"' | '\'' if bracket_depth > 0 => {
                quote = Some(ch);
                current.push(ch);
            }
            '[' => {
                bracket_depth += 1;
                current.push(ch);
            }
            ']' => {
                bracket_depth = bracket_depth.saturating_sub(1);
                current.push(ch);
            }
            '>' if bracket_depth == 0 => {
                if !current.trim().is_empty() {
                    tokens.push(current.trim().to_string());
                }
                current.clear();
                tokens.push(">".to_string());
            }
            '+' | '~' if bracket_depth == 0 => {
                return Err(PagewatchError::invalid_selector(
                    source,
                    format!("unsupported combinator `{ch}`"),
                ));
            }
            c if c.is_ascii_whitespace() && bracket_depth == 0 => {
                if !current.trim().is_empty() {
                    tokens.push(current.trim().to_string());
                }
                current.clear();
            }
            _ => current.push(ch),
        }
    }

    if quote.is_some() {
        return Err(PagewatchError::invalid_selector(source, "unterminated quoted value"));
    }
    if !current.trim().is_empty() {
        tokens.push(current.trim().to_string());
    }
    Ok(tokens)
}

fn parse_chain(source: &str, group: &str) -> Result<Vec<SelectorPart>> {
    let mut parts: Vec<SelectorPart> = Vec::new();
    let mut pending: Option<Combinator> = None;

    for token in tokenize(source, group)? {
        if token == ">" {
            if pending.is_some() || parts.is_empty() {
                return Err(PagewatchError::invalid_selector(source, "dangling `>`"));
            }
            pending = Some(Combinator::Child);
            continue;
        }

        let step = parse_step(source, &token)?;
        let combinator = if parts.is_empty() {
            None
        } else {
            Some(pending.take().unwrap_or(Combinator::Descendant))
        };
        parts.push(SelectorPart { step, combinator });
    }

    if parts.is_empty() || pending.is_some() {
        return Err(PagewatchError::invalid_selector(source, "dangling `>`"));
    }
    Ok(parts)
}

fn parse_step(source: &str, part: &str) -> Result<SelectorStep> {
    let bytes = part.as_bytes();
    let mut i = 0usize;
    let mut step = SelectorStep::default();

    while i < bytes.len() {
        match bytes[i] {
            b'*' => {
                if step.universal || step.tag.is_some() {
                    return Err(PagewatchError::invalid_selector(source, "misplaced `*`"));
                }
                step.universal = true;
                i += 1;
            }
            b'#' => {
                let (id, next) = parse_ident(part, i + 1)
                    .ok_or_else(|| PagewatchError::invalid_selector(source, "expected id after `#`"))?;
                if step.id.replace(id).is_some() {
                    return Err(PagewatchError::invalid_selector(source, "more than one `#id`"));
                }
                i = next;
            }
            b'.' => {
                let (class, next) = parse_ident(part, i + 1).ok_or_else(|| {
                    PagewatchError::invalid_selector(source, "expected class name after `.`")
                })?;
                step.classes.push(class);
                i = next;
            }
            b'[' => {
                let (cond, next) = parse_attr(source, part, i)?;
                step.attrs.push(cond);
                i = next;
            }
            b':' => {
                return Err(PagewatchError::invalid_selector(
                    source,
                    "pseudo-classes are not supported",
                ));
            }
            _ => {
                if step.tag.is_some()
                    || step.universal
                    || step.id.is_some()
                    || !step.classes.is_empty()
                    || !step.attrs.is_empty()
                {
                    return Err(PagewatchError::invalid_selector(
                        source,
                        format!("unexpected `{}`", &part[i..]),
                    ));
                }
                let (tag, next) = parse_ident(part, i).ok_or_else(|| {
                    PagewatchError::invalid_selector(source, format!("unexpected `{}`", &part[i..]))
                })?;
                step.tag = Some(tag.to_ascii_lowercase());
                i = next;
            }
        }
    }

    Ok(step)
}

fn parse_ident(src: &str, start: usize) -> Option<(String, usize)> {
    let rest = src.get(start..)?;
    let len = rest
        .char_indices()
        .find(|(_, c)| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_'))
        .map(|(idx, _)| idx)
        .unwrap_or(rest.len());
    if len == 0 {
        return None;
    }
    Some((rest[..len].to_string(), start + len))
}

fn parse_attr(source: &str, part: &str, start: usize) -> Result<(AttrCondition, usize)> {
    let close = part[start..]
        .find(']')
        .map(|offset| start + offset)
        .ok_or_else(|| PagewatchError::invalid_selector(source, "unterminated `[`"))?;
    let inner = part[start + 1..close].trim();

    let cond = match inner.split_once('=') {
        None => {
            let (key, end) = parse_ident(inner, 0)
                .ok_or_else(|| PagewatchError::invalid_selector(source, "empty attribute name"))?;
            if end != inner.len() {
                return Err(PagewatchError::invalid_selector(
                    source,
                    format!("unsupported attribute test `[{inner}]`"),
                ));
            }
            AttrCondition::Exists { key }
        }
        Some((key, value)) => {
            let key = key.trim();
            if key.is_empty() || parse_ident(key, 0).map(|(_, end)| end) != Some(key.len()) {
                return Err(PagewatchError::invalid_selector(
                    source,
                    format!("unsupported attribute test `[{inner}]`"),
                ));
            }
            AttrCondition::Eq {
                key: key.to_string(),
                value: unquote(value.trim()).to_string(),
            }
        }
    };

    Ok((cond, close + 1))
}

fn unquote(value: &str) -> &str {
    for q in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(q) && value.ends_with(q) {
            return &value[1..value.len() - 1];
        }
    }
    value
}
