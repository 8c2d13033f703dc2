//! One-time platform probe.
//!
//! Decides whether the same GPU buffer may be re-uploaded mid-frame and how
//! many texture units the batcher should ask for by default.

use std::sync::OnceLock;

use bitflags::bitflags;

bitflags! {
    /// Traits of the platform the process was compiled for.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PlatformFlags: u32 {
        /// Phone or tablet class hardware.
        const MOBILE = 1 << 0;
        /// Apple platform (macOS or iOS).
        const APPLE = 1 << 1;
        /// Running inside a browser.
        const WEB = 1 << 2;
    }
}

/// Texture-unit recommendation for mobile GPUs.
pub const MOBILE_MAX_TEXTURES: u32 = 4;

/// Texture-unit recommendation everywhere else.
pub const DESKTOP_MAX_TEXTURES: u32 = 32;

static PLATFORM: OnceLock<PlatformInfo> = OnceLock::new();

/// Result of the platform probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlatformInfo {
    flags: PlatformFlags,
}

impl PlatformInfo {
    /// The process-wide probe result, computed on first use.
    pub fn get() -> &'static PlatformInfo {
        PLATFORM.get_or_init(Self::detect)
    }

    /// Probe the compile target.
    pub fn detect() -> Self {
        let mut flags = PlatformFlags::empty();
        if cfg!(any(target_os = "ios", target_os = "android")) {
            flags |= PlatformFlags::MOBILE;
        }
        if cfg!(any(target_os = "ios", target_os = "macos")) {
            flags |= PlatformFlags::APPLE;
        }
        if cfg!(target_arch = "wasm32") {
            flags |= PlatformFlags::WEB;
        }
        Self { flags }
    }

    /// Build a probe result from explicit flags.
    pub fn from_flags(flags: PlatformFlags) -> Self {
        Self { flags }
    }

    pub fn flags(&self) -> PlatformFlags {
        self.flags
    }

    pub fn is_mobile(&self) -> bool {
        self.flags.contains(PlatformFlags::MOBILE)
    }

    pub fn is_apple_mobile(&self) -> bool {
        self.flags
            .contains(PlatformFlags::MOBILE | PlatformFlags::APPLE)
    }

    /// Whether a buffer that was already drawn from this frame may be overwritten.
    ///
    /// Apple mobile drivers corrupt earlier draws when this happens.
    pub fn can_upload_same_buffer(&self) -> bool {
        !self.is_apple_mobile()
    }

    /// Default cap on texture units.
    pub fn recommended_max_textures(&self) -> u32 {
        if self.is_mobile() {
            MOBILE_MAX_TEXTURES
        } else {
            DESKTOP_MAX_TEXTURES
        }
    }
}
