// OS-specific geometry and table-reread support
#[cfg(target_os = "linux")]
pub mod linux;

#[cfg(target_os = "linux")]
pub use linux::LinuxGeometry as PlatformGeometry;

#[cfg(not(target_os = "linux"))]
pub use parthunt_core::ImageGeometry as PlatformGeometry;
