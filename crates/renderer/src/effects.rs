//! Compute effects: shader discovery, parameters and selection.
//!
//! An effect is a compute shader that writes the render target, plus a
//! 64-byte parameter block pushed as constants before each dispatch. Shaders
//! are found by scanning a directory tree for `.spv` files.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use bytemuck::{Pod, Zeroable};
use glam::Vec4;
use tracing::{debug, warn};

/// Push constant block shared by every effect.
///
/// Layout matches a GLSL `layout(push_constant)` block of four `vec4`s.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct ComputePushConstants {
    pub data1: Vec4,
    pub data2: Vec4,
    pub data3: Vec4,
    pub data4: Vec4,
}

impl ComputePushConstants {
    /// Size of the block in bytes.
    pub const SIZE: u32 = std::mem::size_of::<Self>() as u32;
}

/// A named effect and its current parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct ComputeEffect {
    pub name: String,
    pub data: ComputePushConstants,
}

impl ComputeEffect {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data: ComputePushConstants::zeroed(),
        }
    }
}

/// The loaded effects and which one is drawn.
///
/// Effects are indexed in load order; the backend keeps its pipelines in the
/// same order.
#[derive(Debug, Clone, Default)]
pub struct EffectLibrary {
    effects: Vec<ComputeEffect>,
    current: usize,
}

impl EffectLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, effect: ComputeEffect) {
        self.effects.push(effect);
    }

    pub fn len(&self) -> usize {
        self.effects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }

    /// Index of the selected effect. Always `0` for an empty library.
    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn current(&self) -> Option<&ComputeEffect> {
        self.effects.get(self.current)
    }

    pub fn current_mut(&mut self) -> Option<&mut ComputeEffect> {
        self.effects.get_mut(self.current)
    }

    /// Selects effect `index`, clamped to the last effect.
    pub fn select(&mut self, index: usize) {
        let clamped = index.min(self.effects.len().saturating_sub(1));
        if clamped != index {
            warn!(
                "Effect index {} out of range, using {}",
                index, clamped
            );
        }
        self.current = clamped;
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.effects.iter().map(|e| e.name.as_str())
    }
}

/// Display name for a compiled shader: the stem of its stem.
///
/// `gradient.comp.spv` becomes `gradient`; `sky.spv` becomes `sky`.
pub fn effect_name(path: &Path) -> String {
    let stem = path.file_stem().map(Path::new).unwrap_or(path);
    stem.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Recursively finds `.spv` files under `dir`, sorted by path.
///
/// Returns `(name, path)` pairs with names from [`effect_name`].
///
/// # Errors
///
/// Returns an error if `dir` or any directory beneath it cannot be read.
pub fn discover_effect_shaders(dir: &Path) -> io::Result<Vec<(String, PathBuf)>> {
    let mut paths = Vec::new();
    collect_spirv_files(dir, &mut paths)?;
    paths.sort();

    debug!("Found {} effect shader(s) in {}", paths.len(), dir.display());

    Ok(paths
        .into_iter()
        .map(|path| (effect_name(&path), path))
        .collect())
}

fn collect_spirv_files(dir: &Path, out: &mut Vec<PathBuf>) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_spirv_files(&path, out)?;
        } else if path.extension().is_some_and(|ext| ext == "spv") {
            out.push(path);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_push_constants_are_64_bytes() {
        assert_eq!(ComputePushConstants::SIZE, 64);
        let zero = ComputePushConstants::zeroed();
        assert_eq!(bytemuck::bytes_of(&zero), &[0u8; 64]);
    }

    #[test]
    fn test_push_constants_field_order() {
        let pc = ComputePushConstants {
            data1: Vec4::new(1.0, 0.0, 0.0, 0.0),
            data4: Vec4::new(0.0, 0.0, 0.0, 2.0),
            ..Default::default()
        };
        let floats: &[f32] = bytemuck::cast_slice(bytemuck::bytes_of(&pc));
        assert_eq!(floats[0], 1.0);
        assert_eq!(floats[15], 2.0);
    }

    #[test]
    fn test_effect_name_strips_two_extensions() {
        assert_eq!(effect_name(Path::new("shaders/gradient.comp.spv")), "gradient");
        assert_eq!(effect_name(Path::new("sky.spv")), "sky");
    }

    #[test]
    fn test_discover_recurses_and_sorts() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("sky.comp.spv"), b"").unwrap();
        fs::write(dir.path().join("gradient.comp.spv"), b"").unwrap();
        fs::write(dir.path().join("nested/plasma.comp.spv"), b"").unwrap();
        fs::write(dir.path().join("README.md"), b"").unwrap();
        fs::write(dir.path().join("gradient.comp"), b"").unwrap();

        let found = discover_effect_shaders(dir.path()).unwrap();
        let names: Vec<&str> = found.iter().map(|(n, _)| n.as_str()).collect();

        assert_eq!(names, vec!["gradient", "plasma", "sky"]);
        assert!(found.iter().all(|(_, p)| p.extension().unwrap() == "spv"));
    }

    #[test]
    fn test_discover_empty_dir() {
        let dir = TempDir::new().unwrap();
        assert!(discover_effect_shaders(dir.path()).unwrap().is_empty());
    }

    #[test]
    fn test_discover_missing_dir_is_error() {
        let dir = TempDir::new().unwrap();
        assert!(discover_effect_shaders(&dir.path().join("absent")).is_err());
    }

    #[test]
    fn test_library_selection() {
        let mut library = EffectLibrary::new();
        assert!(library.current().is_none());

        library.push(ComputeEffect::new("gradient"));
        library.push(ComputeEffect::new("sky"));
        assert_eq!(library.current().unwrap().name, "gradient");

        library.select(1);
        assert_eq!(library.current_index(), 1);
        assert_eq!(library.current().unwrap().name, "sky");

        library.select(7);
        assert_eq!(library.current_index(), 1);

        library.current_mut().unwrap().data.data2 = Vec4::ONE;
        assert_eq!(library.current().unwrap().data.data2, Vec4::ONE);
        assert_eq!(library.names().collect::<Vec<_>>(), vec!["gradient", "sky"]);
    }

    #[test]
    fn test_new_effect_parameters_start_zeroed() {
        let effect = ComputeEffect::new("x");
        assert_eq!(effect.data, ComputePushConstants::zeroed());
    }
}
