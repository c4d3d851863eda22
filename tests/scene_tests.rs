//! Scene graph tests
//!
//! Tests for:
//! - Node creation, naming and destruction
//! - Hierarchy operations and their error cases
//! - Render group membership, depth tagging and pending buckets
//! - Structural change tracking across regrouping

mod common;

use anyhow::{Context, Result};
use common::Harness;
use glam::Vec2;
use strata::scene::{BlendMode, Scene};
use strata::StrataError;

fn new_scene() -> Scene {
    Scene::new()
}

// ============================================================================
// Node Lifecycle
// ============================================================================

#[test]
fn scene_create_node() {
    let mut scene = new_scene();
    let node = scene.create_node();
    assert!(scene.contains(node));
    assert_eq!(scene.node_count(), 1);
    assert!(scene.node(node).unwrap().parent().is_none());
}

#[test]
fn scene_create_node_with_name() {
    let mut scene = new_scene();
    let node = scene.create_node_with_name("stage");
    assert_eq!(scene.node(node).unwrap().name(), Some("stage"));

    scene.set_name(node, "world").unwrap();
    assert_eq!(scene.node(node).unwrap().name(), Some("world"));
}

#[test]
fn scene_destroy_node_removes_subtree() -> Result<()> {
    let mut scene = new_scene();
    let root = scene.create_node();
    let a = scene.create_node();
    let b = scene.create_node();
    let c = scene.create_node();
    scene.add_child(root, a)?;
    scene.add_child(a, b)?;
    scene.add_child(b, c)?;

    scene.destroy_node(a)?;

    assert!(scene.contains(root));
    assert!(!scene.contains(a));
    assert!(!scene.contains(b));
    assert!(!scene.contains(c));
    assert!(scene.children(root).is_empty());
    assert_eq!(scene.node_count(), 1);
    Ok(())
}

#[test]
fn scene_destroy_releases_owned_groups() -> Result<()> {
    let mut scene = new_scene();
    let root = scene.create_node();
    let inner = scene.create_node();
    scene.add_child(root, inner)?;
    let top = scene.enable_render_group(root)?;
    let nested = scene.enable_render_group(inner)?;
    let group = scene.render_group(top).context("top-level group missing")?;
    assert_eq!(group.children(), &[nested]);

    scene.destroy_node(inner)?;

    assert!(scene.render_group(nested).is_none());
    assert!(scene.render_group(top).context("top-level group released")?.children().is_empty());
    Ok(())
}

#[test]
fn scene_stale_handle_is_an_error() {
    let mut scene = new_scene();
    let node = scene.create_node();
    scene.destroy_node(node).unwrap();

    let err = scene.set_position(node, Vec2::ONE).unwrap_err();
    assert!(matches!(err, StrataError::NodeNotFound(h) if h == node));
}

// ============================================================================
// Hierarchy
// ============================================================================

#[test]
fn scene_add_child_sets_parent_child() {
    let mut scene = new_scene();
    let parent = scene.create_node();
    let child = scene.create_node();

    scene.add_child(parent, child).unwrap();

    assert_eq!(scene.parent(child), Some(parent));
    assert_eq!(scene.children(parent), &[child]);
}

#[test]
fn scene_add_child_reparents() {
    let mut scene = new_scene();
    let old_parent = scene.create_node();
    let new_parent = scene.create_node();
    let child = scene.create_node();

    scene.add_child(old_parent, child).unwrap();
    scene.add_child(new_parent, child).unwrap();

    assert!(scene.children(old_parent).is_empty());
    assert_eq!(scene.children(new_parent), &[child]);
    assert_eq!(scene.parent(child), Some(new_parent));
}

#[test]
fn scene_add_child_to_current_parent_moves_to_end() {
    let mut scene = new_scene();
    let parent = scene.create_node();
    let a = scene.create_node();
    let b = scene.create_node();
    scene.add_child(parent, a).unwrap();
    scene.add_child(parent, b).unwrap();

    scene.add_child(parent, a).unwrap();

    assert_eq!(scene.children(parent), &[b, a]);
}

#[test]
fn scene_add_child_at_inserts_in_place() {
    let mut scene = new_scene();
    let parent = scene.create_node();
    let a = scene.create_node();
    let b = scene.create_node();
    let c = scene.create_node();
    scene.add_child(parent, a).unwrap();
    scene.add_child(parent, c).unwrap();

    scene.add_child_at(parent, b, 1).unwrap();
    assert_eq!(scene.children(parent), &[a, b, c]);

    let d = scene.create_node();
    let err = scene.add_child_at(parent, d, 7).unwrap_err();
    assert!(matches!(err, StrataError::ChildIndexOutOfBounds { index: 7, len: 3 }));
    assert!(scene.parent(d).is_none());
}

#[test]
fn scene_add_child_at_moves_within_parent() {
    let mut scene = new_scene();
    let parent = scene.create_node();
    let a = scene.create_node();
    let b = scene.create_node();
    let c = scene.create_node();
    scene.add_child(parent, a).unwrap();
    scene.add_child(parent, b).unwrap();
    scene.add_child(parent, c).unwrap();

    scene.add_child_at(parent, c, 0).unwrap();
    assert_eq!(scene.children(parent), &[c, a, b]);
    scene.add_child_at(parent, c, 2).unwrap();
    assert_eq!(scene.children(parent), &[a, b, c]);

    let err = scene.add_child_at(parent, a, 3).unwrap_err();
    assert!(matches!(err, StrataError::ChildIndexOutOfBounds { index: 3, len: 2 }));
    assert_eq!(scene.children(parent), &[a, b, c]);
}

#[test]
fn scene_add_self_as_child_fails() {
    let mut scene = new_scene();
    let node = scene.create_node();
    assert!(matches!(scene.add_child(node, node), Err(StrataError::SelfParent(_))));
}

#[test]
fn scene_add_ancestor_under_descendant_fails() {
    let mut scene = new_scene();
    let a = scene.create_node();
    let b = scene.create_node();
    let c = scene.create_node();
    scene.add_child(a, b).unwrap();
    scene.add_child(b, c).unwrap();

    let err = scene.add_child(c, a).unwrap_err();
    assert!(matches!(err, StrataError::CyclicHierarchy { .. }));
    assert_eq!(scene.parent(b), Some(a));
    assert!(scene.parent(a).is_none());
}

#[test]
fn scene_remove_child_requires_parent_link() {
    let mut scene = new_scene();
    let parent = scene.create_node();
    let stranger = scene.create_node();

    let err = scene.remove_child(parent, stranger).unwrap_err();
    assert!(matches!(err, StrataError::NotAChild { .. }));

    scene.add_child(parent, stranger).unwrap();
    scene.remove_child(parent, stranger).unwrap();
    assert!(scene.parent(stranger).is_none());
    assert!(scene.children(parent).is_empty());
}

// ============================================================================
// Render Group Membership
// ============================================================================

#[test]
fn group_claims_subtree_with_relative_depths() {
    let mut scene = new_scene();
    let root = scene.create_node();
    let a = scene.create_node();
    let b = scene.create_node();
    let c = scene.create_node();
    scene.add_child(root, a).unwrap();
    scene.add_child(a, b).unwrap();
    scene.add_child(b, c).unwrap();

    let group = scene.enable_render_group(root).unwrap();

    for (node, depth) in [(a, 1), (b, 2), (c, 3)] {
        let n = scene.node(node).unwrap();
        assert_eq!(n.parent_render_group(), Some(group));
        assert_eq!(n.relative_render_group_depth(), depth);
        assert_eq!(scene.render_group(group).unwrap().pending_at_depth(depth), &[node]);
    }
    assert!(scene.node(root).unwrap().parent_render_group().is_none());
    assert_eq!(scene.render_group_of(root), Some(group));
}

#[test]
fn nested_group_root_starts_a_new_depth_count() {
    let mut scene = new_scene();
    let root = scene.create_node();
    let a = scene.create_node();
    let inner = scene.create_node();
    let leaf = scene.create_node();
    scene.add_child(root, a).unwrap();
    scene.add_child(a, inner).unwrap();
    scene.add_child(inner, leaf).unwrap();

    let top = scene.enable_render_group(root).unwrap();
    let nested = scene.enable_render_group(inner).unwrap();

    let inner_node = scene.node(inner).unwrap();
    assert_eq!(inner_node.parent_render_group(), Some(top));
    assert_eq!(inner_node.relative_render_group_depth(), 2);

    let leaf_node = scene.node(leaf).unwrap();
    assert_eq!(leaf_node.parent_render_group(), Some(nested));
    assert_eq!(leaf_node.relative_render_group_depth(), 1);

    assert_eq!(scene.render_group(nested).unwrap().parent(), Some(top));
    assert!(!scene.render_group(top).unwrap().is_pending(leaf));
}

#[test]
fn repeated_mutations_register_once() {
    let mut h = Harness::new();
    let root = h.scene.create_node();
    let leaf = h.sprite_under(root);
    h.settle(root);

    let group = h.group_of(root);
    assert_eq!(h.scene.render_group(group).unwrap().pending_count(), 0);

    h.scene.set_position(leaf, Vec2::new(1.0, 0.0)).unwrap();
    h.scene.set_position(leaf, Vec2::new(2.0, 0.0)).unwrap();
    h.scene.set_rotation(leaf, 0.5).unwrap();
    h.scene.set_alpha(leaf, 0.5).unwrap();
    h.scene.set_tint(leaf, 0xFF0000_u32).unwrap();
    h.scene.set_alpha(leaf, 0.25).unwrap();

    let render_group = h.scene.render_group(group).unwrap();
    assert_eq!(render_group.pending_at_depth(1), &[leaf]);
    assert_eq!(render_group.pending_count(), 1);
    assert_eq!(render_group.renderables_to_update(), &[leaf]);
}

#[test]
fn unchanged_value_does_not_register() {
    let mut h = Harness::new();
    let root = h.scene.create_node();
    let leaf = h.sprite_under(root);
    h.settle(root);

    h.scene.set_position(leaf, Vec2::ZERO).unwrap();
    h.scene.set_alpha(leaf, 1.0).unwrap();

    let group = h.group_of(root);
    assert_eq!(h.scene.render_group(group).unwrap().pending_count(), 0);
    assert!(!h.scene.render_group(group).unwrap().structure_did_change());
}

#[test]
fn reparent_between_groups_moves_registration() {
    let mut h = Harness::new();
    let root = h.scene.create_node();
    let a = h.container_under(root);
    let b = h.container_under(root);
    let node = h.sprite_under(a);
    let grandchild = h.sprite_under(node);
    let group_a = h.scene.enable_render_group(a).unwrap();
    let group_b = h.scene.enable_render_group(b).unwrap();
    h.settle(root);

    assert!(!h.scene.render_group(group_a).unwrap().structure_did_change());
    assert!(!h.scene.render_group(group_b).unwrap().structure_did_change());

    h.scene.set_position(node, Vec2::new(5.0, 5.0)).unwrap();
    h.scene.add_child(b, node).unwrap();

    let ga = h.scene.render_group(group_a).unwrap();
    let gb = h.scene.render_group(group_b).unwrap();
    assert!(!ga.is_pending(node));
    assert!(!ga.is_pending(grandchild));
    assert!(ga.structure_did_change());
    assert!(gb.structure_did_change());
    assert_eq!(gb.pending_at_depth(1), &[node]);
    assert_eq!(gb.pending_at_depth(2), &[grandchild]);

    let moved = h.scene.node(node).unwrap();
    assert_eq!(moved.parent_render_group(), Some(group_b));
    assert_eq!(moved.relative_render_group_depth(), 1);
}

#[test]
fn removed_node_leaves_every_bucket() {
    let mut h = Harness::new();
    let root = h.scene.create_node();
    let a = h.container_under(root);
    let leaf = h.sprite_under(a);
    h.settle(root);

    h.scene.set_alpha(leaf, 0.5).unwrap();
    h.scene.remove_from_parent(a).unwrap();

    let group = h.scene.render_group(h.group_of(root)).unwrap();
    assert_eq!(group.pending_count(), 0);
    assert!(group.renderables_to_update().is_empty());
    assert!(h.scene.node(leaf).unwrap().parent_render_group().is_none());
    assert!(!h.scene.node(leaf).unwrap().did_change());
}

#[test]
fn disable_render_group_returns_subtree_to_parent() {
    let mut h = Harness::new();
    let root = h.scene.create_node();
    let inner = h.container_under(root);
    let leaf = h.sprite_under(inner);
    let top = h.scene.enable_render_group(root).unwrap();
    let nested = h.scene.enable_render_group(inner).unwrap();
    h.settle(root);

    h.scene.disable_render_group(inner).unwrap();

    assert!(h.scene.render_group(nested).is_none());
    let leaf_node = h.scene.node(leaf).unwrap();
    assert_eq!(leaf_node.parent_render_group(), Some(top));
    assert_eq!(leaf_node.relative_render_group_depth(), 2);
    assert!(h.scene.render_group(top).unwrap().children().is_empty());
    assert!(h.scene.render_group(top).unwrap().structure_did_change());

    h.render(root);
    let set = h.scene.render_group(top).unwrap().instruction_set();
    assert_eq!(set.renderables().collect::<Vec<_>>(), vec![leaf]);
    assert_eq!(set.render_groups().count(), 0);
}

// ============================================================================
// Structural Flags
// ============================================================================

#[test]
fn display_and_blend_changes_are_structural() {
    let mut h = Harness::new();
    let root = h.scene.create_node();
    let leaf = h.sprite_under(root);
    h.settle(root);
    let group = h.group_of(root);

    h.scene.set_visible(leaf, false).unwrap();
    assert!(h.scene.render_group(group).unwrap().structure_did_change());
    h.settle(root);

    h.scene.set_blend_mode(leaf, BlendMode::Add).unwrap();
    assert!(h.scene.render_group(group).unwrap().structure_did_change());
    h.settle(root);

    h.scene.set_z_index(leaf, 3).unwrap();
    assert!(h.scene.render_group(group).unwrap().structure_did_change());
    assert!(h.scene.node(root).unwrap().sortable_children());
}

#[test]
fn leaf_changes_are_not_structural() {
    let mut h = Harness::new();
    let root = h.scene.create_node();
    let leaf = h.sprite_under(root);
    h.settle(root);
    let group = h.group_of(root);

    h.scene.set_position(leaf, Vec2::new(3.0, 4.0)).unwrap();
    h.scene.set_alpha(leaf, 0.2).unwrap();
    h.scene.set_tint(leaf, [0.5_f32, 0.5, 0.5]).unwrap();
    h.scene.touch_view(leaf).unwrap();

    assert!(!h.scene.render_group(group).unwrap().structure_did_change());
}

// ============================================================================
// Queries
// ============================================================================

#[test]
fn world_queries_require_a_render_group() {
    let mut scene = new_scene();
    let detached = scene.create_node();

    assert!(matches!(scene.world_transform(detached), Err(StrataError::NotInRenderGroup(_))));
    assert!(matches!(scene.world_alpha(detached), Err(StrataError::NotInRenderGroup(_))));
    assert!(matches!(scene.to_global(detached, Vec2::ZERO), Err(StrataError::NotInRenderGroup(_))));
}

#[test]
fn cache_operations_require_a_group_root() {
    let mut scene = new_scene();
    let node = scene.create_node();
    assert!(matches!(scene.disable_cache_as_texture(node), Err(StrataError::NotARenderGroup(_))));
    assert!(matches!(scene.update_cache_texture(node), Err(StrataError::NotARenderGroup(_))));
}

#[test]
fn to_global_and_to_local_are_inverse() {
    let mut h = Harness::new();
    let root = h.scene.create_node();
    let child = h.container_under(root);
    h.scene.set_position(root, Vec2::new(100.0, 50.0)).unwrap();
    h.scene.set_scale(child, Vec2::splat(2.0)).unwrap();
    h.scene.set_rotation(child, 0.3).unwrap();
    h.render(root);

    let p = Vec2::new(3.0, -7.0);
    let global = h.scene.to_global(child, p).unwrap();
    assert!(h.scene.to_local(child, global).unwrap().abs_diff_eq(p, 1e-4));
    assert!(h.scene.to_global(root, Vec2::ZERO).unwrap().abs_diff_eq(Vec2::new(100.0, 50.0), 1e-5));
}
