//! Compute shader modules.
//!
//! Effects are precompiled SPIR-V compute shaders with a `main` entry point.
//! The words are decoded with `ash::util::read_spv`, which checks length and
//! byte order before anything reaches the driver.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use renderer_rhi::device::Device;
//! use renderer_rhi::shader::Shader;
//!
//! # fn example(device: Arc<Device>) -> Result<(), renderer_rhi::RhiError> {
//! let shader = Shader::from_spirv_file(device, Path::new("shaders/gradient.comp.spv"))?;
//! let stage = shader.stage_create_info();
//! # Ok(())
//! # }
//! ```

use std::ffi::CStr;
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Entry point every effect shader exports.
pub const ENTRY_POINT: &CStr = c"main";

/// SPIR-V magic number, little-endian first word of every module.
const SPIRV_MAGIC: u32 = 0x0723_0203;

/// Decodes a SPIR-V binary into 32-bit words.
///
/// # Errors
///
/// Returns [`RhiError::ShaderError`] if the data is not a whole number of
/// words or does not start with the SPIR-V magic number.
pub fn decode_spirv(bytes: &[u8]) -> RhiResult<Vec<u32>> {
    let words = ash::util::read_spv(&mut Cursor::new(bytes))
        .map_err(|e| RhiError::ShaderError(format!("invalid SPIR-V: {}", e)))?;

    match words.first() {
        Some(&SPIRV_MAGIC) => Ok(words),
        Some(&other) => Err(RhiError::ShaderError(format!(
            "invalid SPIR-V magic number {:#010x}",
            other
        ))),
        None => Err(RhiError::ShaderError("empty SPIR-V module".to_string())),
    }
}

/// Compute shader module.
pub struct Shader {
    device: Arc<Device>,
    module: vk::ShaderModule,
}

impl Shader {
    /// Reads and creates a compute shader module from `path`.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::ShaderError`] if the file cannot be read or is not
    /// valid SPIR-V, or the Vulkan error if module creation fails.
    pub fn from_spirv_file(device: Arc<Device>, path: &Path) -> RhiResult<Self> {
        debug!("Loading compute shader from {:?}", path);

        let bytes = std::fs::read(path).map_err(|e| {
            RhiError::ShaderError(format!("Failed to read shader file {:?}: {}", path, e))
        })?;

        Self::from_spirv_bytes(device, &bytes)
    }

    /// Creates a compute shader module from SPIR-V bytes.
    ///
    /// # Errors
    ///
    /// See [`Shader::from_spirv_file`].
    pub fn from_spirv_bytes(device: Arc<Device>, bytes: &[u8]) -> RhiResult<Self> {
        let code = decode_spirv(bytes)?;
        let create_info = vk::ShaderModuleCreateInfo::default().code(&code);
        let module = unsafe { device.handle().create_shader_module(&create_info, None)? };

        Ok(Self { device, module })
    }

    #[inline]
    pub fn handle(&self) -> vk::ShaderModule {
        self.module
    }

    /// Compute stage description borrowing this module.
    pub fn stage_create_info(&self) -> vk::PipelineShaderStageCreateInfo<'_> {
        vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::COMPUTE)
            .module(self.module)
            .name(ENTRY_POINT)
    }
}

impl Drop for Shader {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_shader_module(self.module, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words_to_bytes(words: &[u32]) -> Vec<u8> {
        words.iter().flat_map(|w| w.to_le_bytes()).collect()
    }

    #[test]
    fn test_decode_valid_header() {
        let bytes = words_to_bytes(&[SPIRV_MAGIC, 0x0001_0000, 0, 8, 0]);
        let words = decode_spirv(&bytes).unwrap();
        assert_eq!(words.len(), 5);
        assert_eq!(words[0], SPIRV_MAGIC);
    }

    #[test]
    fn test_decode_rejects_misaligned() {
        let mut bytes = words_to_bytes(&[SPIRV_MAGIC, 0x0001_0000]);
        bytes.push(0);
        assert!(matches!(
            decode_spirv(&bytes),
            Err(RhiError::ShaderError(_))
        ));
    }

    #[test]
    fn test_decode_rejects_wrong_magic() {
        let bytes = words_to_bytes(&[0xdead_beef, 0]);
        let err = decode_spirv(&bytes).unwrap_err();
        assert!(err.to_string().contains("magic"));
    }

    #[test]
    fn test_decode_rejects_empty() {
        assert!(decode_spirv(&[]).is_err());
    }

    #[test]
    fn test_entry_point_is_main() {
        assert_eq!(ENTRY_POINT.to_str().unwrap(), "main");
    }
}
