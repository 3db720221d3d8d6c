//! Cross-module invariant tests.
//!
//! Each test drives a module through a long, seeded sequence of operations
//! and checks structural invariants after every step.

use std::sync::Arc;

use chimera::cli::Cli;
use chimera::client::Client;
use chimera::config::Config;
use chimera::net::protocol::{AnimationsConfig, MapInfo, ObjectPayload, ObjectType, TileLight};
use chimera::paths::Paths;
use chimera::render::Projection;
use chimera::states::{StateArgs, StateKind, StateMachine, Transition};
use chimera::ui::{ElementId, ElementKind, ElementSpec, ElementTree, MonoMeasurer, Ui};
use chimera::world::World;

/// Small deterministic generator so failures replay.
struct Seq(u64);

impl Seq {
    fn next(&mut self) -> u64 {
        self.0 ^= self.0 << 13;
        self.0 ^= self.0 >> 7;
        self.0 ^= self.0 << 17;
        self.0
    }

    fn below(&mut self, n: usize) -> usize {
        (self.next() % n as u64) as usize
    }
}

fn tree() -> ElementTree {
    ElementTree::new(640.0, 480.0, Box::new(MonoMeasurer::default()))
}

fn live(tree: &ElementTree) -> Vec<ElementId> {
    tree.iter().map(|(id, _)| id).collect()
}

fn assert_tree_integrity(tree: &ElementTree) {
    for (id, element) in tree.iter() {
        for child in &element.children {
            let c = tree.get(*child).expect("child is live");
            assert_eq!(c.parent, Some(id), "child points back at its parent");
            let count = element.children.iter().filter(|x| *x == child).count();
            assert_eq!(count, 1, "child listed exactly once");
        }
        if let Some(parent) = element.parent {
            let p = tree.get(parent).expect("parent is live");
            assert!(p.children.contains(&id), "parent lists the child");
        }
    }
}

fn assert_single_focus(tree: &ElementTree) {
    let focused: Vec<_> = tree.iter().filter(|(_, e)| e.focused).map(|(id, _)| id).collect();
    assert!(focused.len() <= 1, "at most one focused element");
    assert_eq!(focused.first().copied(), tree.focused());
}

#[test]
fn tree_integrity_and_focus_survive_random_edits() {
    for seed in [1u64, 7, 42, 1234, 99_999] {
        let mut seq = Seq(seed);
        let mut t = tree();
        let root = t.root();
        for _ in 0..400 {
            let ids = live(&t);
            let pick = ids[seq.below(ids.len())];
            match seq.below(6) {
                0 | 1 => {
                    let kind = if seq.below(2) == 0 {
                        ElementKind::Container
                    } else {
                        ElementKind::input()
                    };
                    t.spawn(pick, ElementSpec::new(kind).style("W 10\nH 10"));
                }
                2 => t.destroy(pick),
                3 => {
                    let other = ids[seq.below(ids.len())];
                    if let Some(parent) = t.get(pick).and_then(|e| e.parent) {
                        t.disown(parent, pick);
                        if !t.adopt(other, pick) {
                            t.adopt(parent, pick);
                        }
                    }
                }
                4 => t.focus(pick),
                _ => t.blur(),
            }
            assert!(t.contains(root));
            assert_tree_integrity(&t);
            assert_single_focus(&t);
        }
    }
}

#[test]
fn destroying_a_subtree_removes_every_descendant() {
    let mut t = tree();
    let root = t.root();
    let a = t.spawn(root, ElementSpec::new(ElementKind::Container));
    let b = t.spawn(a, ElementSpec::new(ElementKind::Container));
    let c = t.spawn(b, ElementSpec::new(ElementKind::input()));
    t.focus(c);
    t.destroy(a);
    for id in [a, b, c] {
        assert!(!t.contains(id));
    }
    assert_eq!(t.focused(), None);
    assert_eq!(t.get(root).map(|e| e.children.len()), Some(0));
}

#[test]
fn adopt_then_disown_leaves_an_orphan() {
    let mut t = tree();
    let root = t.root();
    let orphan = t.create(ElementSpec::new(ElementKind::Text).value("x"));
    assert!(t.adopt(root, orphan));
    assert!(!t.adopt(root, orphan), "second adopt needs a disown first");
    assert!(t.disown(root, orphan));
    assert_eq!(t.get(orphan).and_then(|e| e.parent), None);
    assert!(!t.is_attached(orphan));
    assert_tree_integrity(&t);
}

#[test]
fn children_of_plain_elements_are_offset_from_their_parent() {
    let mut t = tree();
    let root = t.root();
    let button = t.spawn(
        root,
        ElementSpec::new(ElementKind::Button).style("X 30\nY 40\nW 100\nH 20"),
    );
    let label = t.spawn(
        button,
        ElementSpec::new(ElementKind::Text).value("ok").style("X 5\nY 3"),
    );
    t.layout();
    let b = t.get(button).map(|e| e.layout).expect("button");
    let l = t.get(label).map(|e| e.layout).expect("label");
    assert_eq!(l.ax, b.ax + 5.0 - b.sl);
    assert_eq!(l.ay, b.ay + 3.0 - b.st);
}

#[test]
fn container_children_follow_the_scroll_offset() {
    let mut t = tree();
    let root = t.root();
    let pane = t.spawn(
        root,
        ElementSpec::new(ElementKind::Container).style("X 10\nY 10\nW 200\nH 200\nScrollLeft 25"),
    );
    let item = t.spawn(
        pane,
        ElementSpec::new(ElementKind::Container).style("X 50\nY 0\nW 10\nH 10"),
    );
    t.layout();
    let p = t.get(pane).map(|e| e.layout).expect("pane");
    let i = t.get(item).map(|e| e.layout).expect("item");
    assert_eq!(i.sx, p.sx + 50.0 - 25.0);
}

#[test]
fn percentages_against_an_empty_parent_are_zero() {
    let mut t = tree();
    let root = t.root();
    let empty = t.spawn(
        root,
        ElementSpec::new(ElementKind::Container).style("W 0\nH 0"),
    );
    let child = t.spawn(
        empty,
        ElementSpec::new(ElementKind::Container).style("X 50%\nY 50%\nW 100%\nH 25%"),
    );
    t.layout();
    let l = t.get(child).map(|e| e.layout).expect("child");
    for v in [l.x, l.y, l.w, l.h, l.ax, l.ay] {
        assert!(v.is_finite());
        assert_eq!(v, 0.0);
    }
}

fn map_info() -> MapInfo {
    MapInfo {
        map_id: 3,
        height: 6,
        width: 6,
        depth: 3,
        ..Default::default()
    }
}

#[test]
fn world_lookup_and_missing_flags_hold_under_random_tiles() {
    for seed in [3u64, 11, 2024] {
        let mut seq = Seq(seed);
        let mut world = World::new();
        world.set_map(&map_info());
        for step in 0..500 {
            match seq.below(5) {
                0 | 1 | 2 => {
                    let (y, x, z) = (seq.below(6) as u32, seq.below(6) as u32, seq.below(3) as u32);
                    let n = seq.below(4);
                    let mut ids: Vec<u32> = (0..n).map(|_| seq.below(12) as u32 + 1).collect();
                    let mut seen = std::collections::HashSet::new();
                    ids.retain(|id| seen.insert(*id));
                    world.set_tile(y, x, z, &ids, TileLight::default());
                }
                3 => world.apply_object(seq.below(12) as u32 + 1, ObjectPayload::Delete),
                _ => world.apply_object(
                    seq.below(12) as u32 + 1,
                    ObjectPayload::Create {
                        kind: ObjectType::Item,
                        animation_id: 0,
                        face_id: 0,
                        h: 1,
                        w: 1,
                        d: 1,
                        reach: 0,
                    },
                ),
            }
            assert!(world.is_consistent(), "seed {seed} step {step}");
            for o in world.objects() {
                assert_eq!(world.object(o.id).map(|x| x.id), Some(o.id));
            }
        }
    }
}

#[test]
fn later_objects_in_a_tile_sort_above_earlier_ones() {
    let mut world = World::new();
    world.set_map(&map_info());
    world.set_tile(2, 2, 1, &[5, 9, 7], TileLight::default());
    let config = AnimationsConfig::default();
    let p = Projection::new(&config, 6, 6, 3, 1.0);
    let z = |id: u32| {
        let o = world.object(id).expect("object");
        p.z_index(o.y, o.x, o.z, o.index)
    };
    assert!(z(5) < z(9));
    assert!(z(9) < z(7));
}

#[test]
fn pop_to_top_leaves_one_screen() {
    let dir = std::env::temp_dir().join(format!("chimera-inv-{}", std::process::id()));
    let client = Arc::new(Client::new(&Cli::default(), Paths::rooted(&dir), Config::default()));
    let mut ui = Ui::new(800.0, 600.0, Box::new(MonoMeasurer::default()));
    let mut m = StateMachine::new(client);
    m.apply(&mut ui, Transition::Push(StateKind::List, StateArgs::None));
    // Offline screens that fail to start unwind back to the list.
    m.apply(&mut ui, Transition::Push(StateKind::Login, StateArgs::None));
    m.apply(&mut ui, Transition::Push(StateKind::Register, StateArgs::None));
    m.apply(&mut ui, Transition::PopToTop(StateArgs::None));
    assert_eq!(m.kinds(), vec![StateKind::List]);
    assert_tree_integrity(&ui.tree);
    assert!(ui.tree.find("Servers").is_some());
}
