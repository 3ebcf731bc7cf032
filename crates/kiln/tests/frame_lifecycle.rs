//! # Frame Lifecycle Tests
//!
//! End-to-end runs of the frame loop: config from disk, persistent meshes
//! addressed by name, per-frame file loading, scoped scratch, and the
//! halt-on-first-error contract.
//!
//! Run with: cargo test -p kiln --test frame_lifecycle

use std::path::PathBuf;

use kiln::memory::{Arena, BufferView, MemoryError};
use kiln::resources::{ConstantString, ResourceError};
use kiln::{read_file, ConfigError, EngineError, FrameLoop, MemoryConfig};

// ============================================================================
// FIXTURES
// ============================================================================

const TERRAIN: ConstantString = ConstantString::new("mesh.terrain");
const SKYBOX: ConstantString = ConstantString::new("mesh.skybox");

struct Mesh {
    vertices: BufferView<[f32; 3]>,
}

fn temp_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("kiln_lifecycle_{}_{name}", std::process::id()))
}

fn small_config() -> MemoryConfig {
    MemoryConfig::from_toml_str(
        r#"
linear_capacity = 4096
stack_capacity = 2048
pool_capacity = 8192
handle_table_capacity = 16
handle_cache_slots = 8
"#,
    )
    .unwrap()
}

// ============================================================================
// CONFIG
// ============================================================================

#[test]
fn config_file_drives_arena_sizes() {
    let path = temp_path("kiln.toml");
    std::fs::write(&path, "linear_capacity = 1024\npool_capacity = 2048\n").unwrap();

    let config = MemoryConfig::from_file(&path).unwrap();
    let frames = FrameLoop::new(&config).unwrap();
    assert_eq!(frames.context().linear.capacity(), 1024);
    assert_eq!(frames.context().pool.capacity(), 2048);
    assert_eq!(
        frames.context().stack.capacity(),
        MemoryConfig::default().stack_capacity
    );
    std::fs::remove_file(path).unwrap();
}

#[test]
fn missing_config_file_is_an_io_error() {
    let err = MemoryConfig::from_file(temp_path("absent.toml")).unwrap_err();
    assert!(matches!(err, ConfigError::Io { .. }));
    assert!(matches!(EngineError::from(err), EngineError::Config(_)));
}

// ============================================================================
// STEADY STATE
// ============================================================================

#[test]
fn persistent_meshes_survive_frames() {
    let mut frames = FrameLoop::new(&small_config()).unwrap();
    let mut meshes = frames.context().new_table::<Mesh>("meshes").unwrap();

    // Setup outside any frame.
    let context = frames.context_mut();
    let vertices = context.alloc_persistent::<[f32; 3]>(3).unwrap();
    context
        .pool
        .get_mut(vertices)
        .unwrap()
        .copy_from_slice(&[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]]);
    meshes.register_with(TERRAIN, Mesh { vertices }).unwrap();

    frames
        .run(30, |memory, frame| {
            let mesh = meshes.resolve(TERRAIN)?;
            let count = mesh.vertices.count();

            // Per-frame transformed copy.
            let transformed = memory.alloc_frame::<[f32; 3]>(count)?;
            let offset = frame as f32;
            let out = memory.linear.get_mut(transformed)?;
            for (dst, src) in out.iter_mut().zip(memory.pool.get(mesh.vertices)?) {
                *dst = [src[0] + offset, src[1], src[2]];
            }
            assert_eq!(memory.linear.get(transformed)?[1][0], 1.0 + offset);
            Ok(())
        })
        .unwrap();

    assert_eq!(frames.frame_count(), 30);
    assert_eq!(frames.context().pool.live_blocks(), 1);
    assert!(meshes.cache_stats().hits >= 30);
}

#[test]
fn files_are_reloaded_every_frame() {
    let path = temp_path("level.bin");
    std::fs::write(&path, [1u8, 2, 3, 4, 5]).unwrap();
    let mut frames = FrameLoop::new(&small_config()).unwrap();

    let mut previous = None;
    frames
        .run(3, |memory, _| {
            if let Some(stale) = previous {
                let old = read_file_result(&memory.linear, stale);
                assert!(matches!(old, Err(MemoryError::StaleView { .. })));
            }
            let file = read_file(&path, &mut memory.linear)?;
            let sum: u32 = file.bytes(&memory.linear)?.iter().map(|&b| u32::from(b)).sum();
            assert_eq!(sum, 15);
            previous = Some(file.view());
            Ok(())
        })
        .unwrap();
    std::fs::remove_file(path).unwrap();
}

fn read_file_result(
    linear: &kiln::memory::LinearAllocator,
    view: BufferView<u8>,
) -> Result<usize, MemoryError> {
    linear.get(view).map(<[u8]>::len)
}

#[test]
fn nested_scopes_inside_a_frame() {
    let mut frames = FrameLoop::new(&small_config()).unwrap();
    let total = frames
        .run_frame(|memory, _| {
            memory.stack.scope("outer", |stack| {
                let a = stack.alloc_slice::<u64>(8, "outer_list")?;
                let inner_sum = stack.scope("inner", |stack| {
                    let b = stack.alloc_slice::<u64>(8, "inner_list")?;
                    stack.get_mut(b)?.fill(2);
                    Ok::<_, EngineError>(stack.get(b)?.iter().sum::<u64>())
                })?;
                stack.get_mut(a)?.fill(1);
                Ok::<_, EngineError>(inner_sum + stack.get(a)?.iter().sum::<u64>())
            })
        })
        .unwrap();
    assert_eq!(total, 24);
    assert_eq!(frames.context().stack.depth(), 0);
}

// ============================================================================
// FATAL PATHS
// ============================================================================

#[test]
fn unknown_resource_halts_the_loop() {
    let mut frames = FrameLoop::new(&small_config()).unwrap();
    let mut meshes = frames.context().new_table::<u32>("meshes").unwrap();
    meshes.register(TERRAIN).unwrap();

    let mut ran = 0;
    let err = frames
        .run(10, |_, frame| {
            ran += 1;
            meshes.resolve(TERRAIN)?;
            if frame == 4 {
                meshes.resolve(SKYBOX)?;
            }
            Ok(())
        })
        .unwrap_err();

    assert!(matches!(
        err,
        EngineError::Resource(ResourceError::UnknownName { table: "meshes", .. })
    ));
    assert_eq!(ran, 5);
    assert_eq!(frames.frame_count(), 4);
    assert!(matches!(
        frames.run_frame(|_, _| Ok(())),
        Err(EngineError::Halted { frame: 4 })
    ));
}

#[test]
fn pool_exhaustion_reports_the_call_site() {
    let mut frames = FrameLoop::new(&small_config()).unwrap();
    let err = frames
        .run_frame(|memory, _| {
            memory.alloc_persistent::<u8>(16 * 1024)?;
            Ok(())
        })
        .unwrap_err();

    let message = err.to_string();
    assert!(message.contains("pool arena exhausted"), "{message}");
    assert!(message.contains("frame_lifecycle.rs"), "{message}");
}

#[test]
fn marker_left_open_by_scope_body_halts() {
    let mut frames = FrameLoop::new(&small_config()).unwrap();
    let err = frames
        .run_frame(|memory, _| {
            let outer = memory.stack.push_marker("frame_root");
            let _ = memory.stack.alloc_slice::<u32>(4, "visible_set")?;
            std::mem::forget(outer);
            Ok(())
        })
        .unwrap_err();
    match err {
        EngineError::UnbalancedStack { depth, open, .. } => {
            assert_eq!(depth, 1);
            assert!(open.contains("frame_root"), "{open}");
        }
        other => panic!("unexpected error: {other}"),
    }
}
