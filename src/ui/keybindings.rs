//! Named commands, keyboard bindings, and slash-command parsing.
//!
//! A binding is a name that owns at most one callable and any number of
//! [`KeyGroup`]s. Keyboard events are turned into a `KeyGroup` and every
//! name with a structurally equal group is triggered. Slash-commands look
//! names up directly.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use super::keys::{self, KeyEvent, Modifiers};
use crate::error::{ClientError, Result};

fn default_pressed() -> bool {
    true
}

/// Structural key for a binding: the keys held, the modifiers, and the
/// press/repeat phase of the event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyGroup {
    pub keys: SmallVec<[u32; 2]>,
    #[serde(default)]
    pub modifiers: Modifiers,
    #[serde(default = "default_pressed")]
    pub pressed: bool,
    #[serde(default)]
    pub repeat: bool,
    #[serde(default)]
    pub on_repeat: u32,
}

impl KeyGroup {
    /// Initial press of a single key.
    pub fn press(code: u32) -> Self {
        Self::chord(&[code])
    }

    /// Initial press of several keys held together. Key order is ignored.
    pub fn chord(codes: &[u32]) -> Self {
        let mut keys: SmallVec<[u32; 2]> = codes.iter().copied().collect();
        keys.sort_unstable();
        keys.dedup();
        Self {
            keys,
            modifiers: Modifiers::empty(),
            pressed: true,
            repeat: false,
            on_repeat: 0,
        }
    }

    pub fn with_modifiers(mut self, modifiers: Modifiers) -> Self {
        self.modifiers = modifiers;
        self
    }

    /// Matches the `n`th auto-repeat of the key.
    pub fn on_repeat(mut self, n: u32) -> Self {
        self.repeat = true;
        self.on_repeat = n;
        self
    }

    /// Matches the release instead of the press.
    pub fn released(mut self) -> Self {
        self.pressed = false;
        self
    }

    pub fn same(&self, other: &KeyGroup) -> bool {
        self == other
    }

    /// Display label, e.g. "Ctrl+Shift+K".
    pub fn label(&self) -> String {
        let mut parts: Vec<String> = Vec::new();
        if self.modifiers.contains(Modifiers::CTRL) {
            parts.push("Ctrl".into());
        }
        if self.modifiers.contains(Modifiers::ALT) {
            parts.push("Alt".into());
        }
        if self.modifiers.contains(Modifiers::SHIFT) {
            parts.push("Shift".into());
        }
        if self.modifiers.contains(Modifiers::GUI) {
            parts.push("Super".into());
        }
        parts.extend(self.keys.iter().map(|k| keys::key_name(*k)));
        parts.join("+")
    }
}

/// A bound callable. Receives the caller's context and the remaining words
/// of the invocation.
pub type Command<C> = Box<dyn FnMut(&mut C, &[String]) -> Result<()> + Send>;

/// Name registry for commands and the key groups bound to them.
pub struct Bindings<C> {
    commands: HashMap<String, Command<C>>,
    keys: BTreeMap<String, Vec<KeyGroup>>,
    /// Auto-repeats seen since each key went down.
    repeats: HashMap<u32, u32>,
    /// Non-modifier keys currently down.
    down: HashSet<u32>,
    pub prefix: String,
}

impl<C> Bindings<C> {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            commands: HashMap::new(),
            keys: BTreeMap::new(),
            repeats: HashMap::new(),
            down: HashSet::new(),
            prefix: prefix.into(),
        }
    }

    /// Register the callable for `name`, replacing any previous one.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        command: impl FnMut(&mut C, &[String]) -> Result<()> + Send + 'static,
    ) {
        self.commands.insert(name.into(), Box::new(command));
    }

    pub fn bind(&mut self, name: impl Into<String>, group: KeyGroup) {
        let groups = self.keys.entry(name.into()).or_default();
        if !groups.contains(&group) {
            groups.push(group);
        }
    }

    /// Replace the key groups of every name in `overrides`.
    pub fn apply_overrides(&mut self, overrides: &BTreeMap<String, Vec<KeyGroup>>) {
        for (name, groups) in overrides {
            if !self.commands.contains_key(name) {
                log::warn!("binding override for unknown command {name:?}");
            }
            self.keys.insert(name.clone(), groups.clone());
        }
    }

    pub fn has(&self, name: &str) -> bool {
        self.commands.contains_key(name)
    }

    pub fn keys_for(&self, name: &str) -> &[KeyGroup] {
        self.keys.get(name).map_or(&[], Vec::as_slice)
    }

    pub fn key_map(&self) -> &BTreeMap<String, Vec<KeyGroup>> {
        &self.keys
    }

    /// Label of the first key group bound to `name`.
    pub fn label_for(&self, name: &str) -> Option<String> {
        self.keys_for(name).first().map(KeyGroup::label)
    }

    /// Invoke `name` once with `args`.
    pub fn run(&mut self, ctx: &mut C, name: &str, args: &[String]) -> Result<()> {
        let command = self
            .commands
            .get_mut(name)
            .ok_or_else(|| ClientError::Binding(format!("unknown command: {name}")))?;
        command(ctx, args)
    }

    /// Forget held keys, e.g. after the window loses focus.
    pub fn reset(&mut self) {
        self.down.clear();
        self.repeats.clear();
    }

    /// Track an event that something else consumed, such as a focused
    /// input. Nothing fires, but a release still lets go of the key.
    pub fn observe(&mut self, event: KeyEvent) {
        if !event.pressed {
            self.repeats.remove(&event.code);
            self.down.remove(&event.code);
        }
    }

    /// The key group an event corresponds to, updating repeat counters.
    pub fn group_for(&mut self, event: KeyEvent) -> KeyGroup {
        let code = event.code;
        let mut held: SmallVec<[u32; 2]> = self.down.iter().copied().collect();
        if !held.contains(&code) {
            held.push(code);
        }
        let mut group = KeyGroup::chord(&held).with_modifiers(event.modifiers);
        if event.pressed {
            if event.repeat {
                let n = self.repeats.entry(code).or_insert(0);
                *n += 1;
                group = group.on_repeat(*n);
            } else {
                self.repeats.insert(code, 0);
                self.down.insert(code);
            }
        } else {
            let repeated = self.repeats.remove(&code).unwrap_or(0) > 0;
            self.down.remove(&code);
            group = group.released();
            if repeated {
                group = group.on_repeat(1);
            }
        }
        group
    }

    /// Trigger every name bound to the event's key group. Returns the names
    /// that fired.
    pub fn handle_key(&mut self, ctx: &mut C, event: KeyEvent) -> Vec<String> {
        let group = self.group_for(event);
        let names: Vec<String> = self
            .keys
            .iter()
            .filter(|(_, groups)| groups.iter().any(|g| g.same(&group)))
            .map(|(name, _)| name.clone())
            .collect();
        for name in &names {
            if let Err(e) = self.run(ctx, name, &[]) {
                log::warn!("binding {name:?} failed: {e}");
            }
        }
        names
    }

    /// Split `words` into the longest registered command name and its
    /// arguments.
    pub fn resolve<'w>(&self, words: &'w [String]) -> Option<(String, &'w [String])> {
        (1..=words.len()).rev().find_map(|n| {
            let name = words[..n].join(" ");
            self.commands.contains_key(&name).then(|| (name, &words[n..]))
        })
    }

    /// Run a slash-command line. Returns `Ok(false)` if the line does not
    /// start with the prefix.
    pub fn run_line(&mut self, ctx: &mut C, line: &str) -> Result<bool> {
        let Some(invocations) = parse_command_line(line, &self.prefix)? else {
            return Ok(false);
        };
        for words in invocations {
            let (name, args) = self.resolve(&words).ok_or_else(|| {
                ClientError::Binding(format!("unknown command: {}", words.join(" ")))
            })?;
            let args = args.to_vec();
            self.run(ctx, &name, &args)?;
        }
        Ok(true)
    }
}

/// Parse a slash-command line into a list of invocations, each a list of
/// words. Returns `None` when `line` does not start with `prefix`.
///
/// `cmd [a*3, b]` expands to three `a` invocations followed by one `b`.
pub fn parse_command_line(line: &str, prefix: &str) -> Result<Option<Vec<Vec<String>>>> {
    let Some(rest) = line.strip_prefix(prefix).filter(|_| !prefix.is_empty()) else {
        return Ok(None);
    };
    let rest = rest.trim();
    if rest.is_empty() {
        return Err(ClientError::Binding("empty command".into()));
    }
    let words = |s: &str| -> Vec<String> { s.split_whitespace().map(str::to_string).collect() };

    let Some(list) = rest.strip_prefix("cmd").filter(|r| r.trim_start().starts_with('[')) else {
        return Ok(Some(vec![words(rest)]));
    };
    let list = list.trim();
    let inner = list
        .strip_prefix('[')
        .and_then(|l| l.strip_suffix(']'))
        .ok_or_else(|| ClientError::Binding(format!("malformed command list: {list}")))?;

    let mut out = Vec::new();
    for entry in inner.split(',') {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        let (body, count) = match entry.rsplit_once('*') {
            Some((body, n)) => {
                let n: usize = n.trim().parse().map_err(|_| {
                    ClientError::Binding(format!("bad multiplier in {entry:?}"))
                })?;
                (body.trim(), n)
            }
            None => (entry, 1),
        };
        if body.is_empty() {
            return Err(ClientError::Binding(format!("empty entry in {list}")));
        }
        let invocation = words(body);
        for _ in 0..count {
            out.push(invocation.clone());
        }
    }
    Ok(Some(out))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Log(Vec<String>);

    fn bindings() -> Bindings<Log> {
        let mut b = Bindings::new("/");
        for name in ["north", "north run", "north run stop", "say"] {
            b.register(name, move |log: &mut Log, args: &[String]| {
                log.0.push(format!("{name}{}", args.iter().map(|a| format!(" {a}")).collect::<String>()));
                Ok(())
            });
        }
        let k = keys::ascii('k');
        b.bind("north", KeyGroup::press(k));
        b.bind("north run", KeyGroup::press(k).on_repeat(1));
        b.bind("north run stop", KeyGroup::press(k).released().on_repeat(1));
        b
    }

    #[test]
    fn press_repeat_release() {
        let mut b = bindings();
        let mut log = Log::default();
        let k = keys::ascii('k');
        b.handle_key(&mut log, KeyEvent::press(k));
        b.handle_key(&mut log, KeyEvent::repeat(k));
        b.handle_key(&mut log, KeyEvent::repeat(k));
        b.handle_key(&mut log, KeyEvent::release(k));
        assert_eq!(log.0, vec!["north", "north run", "north run stop"]);
    }

    #[test]
    fn release_without_repeat_is_plain() {
        let mut b = bindings();
        let mut log = Log::default();
        let k = keys::ascii('k');
        b.handle_key(&mut log, KeyEvent::press(k));
        let fired = b.handle_key(&mut log, KeyEvent::release(k));
        assert!(fired.is_empty());
        assert_eq!(log.0, vec!["north"]);
    }

    #[test]
    fn release_consumed_elsewhere_lets_go_of_the_key() {
        let mut b = bindings();
        let mut log = Log::default();
        let j = keys::ascii('j');
        let k = keys::ascii('k');
        b.handle_key(&mut log, KeyEvent::press(j));
        b.observe(KeyEvent::press(k));
        b.observe(KeyEvent::release(j));
        b.handle_key(&mut log, KeyEvent::press(k));
        assert_eq!(log.0, vec!["north"]);
    }

    #[test]
    fn modifiers_are_part_of_the_group() {
        let mut b = bindings();
        let mut log = Log::default();
        let k = keys::ascii('k');
        b.handle_key(&mut log, KeyEvent::press(k).with_modifiers(Modifiers::CTRL));
        assert!(log.0.is_empty());
    }

    #[test]
    fn chords_ignore_order() {
        let a = KeyGroup::chord(&[2, 1]);
        let b = KeyGroup::chord(&[1, 2]);
        assert!(a.same(&b));
        assert_ne!(a, b.clone().released());
    }

    #[test]
    fn slash_commands() {
        let mut b = bindings();
        let mut log = Log::default();
        assert!(b.run_line(&mut log, "/say hello there").expect("say"));
        assert!(b.run_line(&mut log, "/north run").expect("run"));
        assert!(!b.run_line(&mut log, "plain chat").expect("chat"));
        assert_eq!(log.0, vec!["say hello there", "north run"]);
    }

    #[test]
    fn cmd_list_multipliers() {
        let parsed = parse_command_line("/cmd [a*3, b, c*2]", "/")
            .expect("parse")
            .expect("prefixed");
        let names: Vec<String> = parsed.iter().map(|w| w.join(" ")).collect();
        assert_eq!(names, vec!["a", "a", "a", "b", "c", "c"]);
    }

    #[test]
    fn malformed_lists_and_unknown_names() {
        assert!(matches!(
            parse_command_line("/cmd [a*x]", "/"),
            Err(ClientError::Binding(_))
        ));
        assert!(matches!(
            parse_command_line("/cmd [a, b", "/"),
            Err(ClientError::Binding(_))
        ));
        let mut b = bindings();
        let err = b.run_line(&mut Log::default(), "/dance").expect_err("unknown");
        assert_eq!(err.to_string(), "unknown command: dance");
    }

    #[test]
    fn labels() {
        let b = bindings();
        assert_eq!(b.label_for("north").as_deref(), Some("K"));
        let g = KeyGroup::press(keys::ESCAPE).with_modifiers(Modifiers::CTRL | Modifiers::SHIFT);
        assert_eq!(g.label(), "Ctrl+Shift+Esc");
    }

    #[test]
    fn overrides_replace_groups() {
        let mut b = bindings();
        let mut map = BTreeMap::new();
        map.insert("north".to_string(), vec![KeyGroup::press(keys::UP)]);
        b.apply_overrides(&map);
        assert_eq!(b.keys_for("north"), &[KeyGroup::press(keys::UP)]);
        let mut log = Log::default();
        b.handle_key(&mut log, KeyEvent::press(keys::UP));
        assert_eq!(log.0, vec!["north"]);
    }
}
