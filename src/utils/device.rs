//! Information about the device we are running on

#[cfg(target_os = "android")]
use std::ffi::{CStr, CString};

use tracing::debug;

/// System property set to `1` by the Android emulator kernel
pub const QEMU_PROPERTY: &str = "ro.kernel.qemu";
/// System property holding the device manufacturer
pub const MANUFACTURER_PROPERTY: &str = "ro.product.manufacturer";

/// Facts about the device that influence GPU setup
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeviceProfile {
    /// Value of [`QEMU_PROPERTY`]
    pub qemu: Option<String>,
    /// Value of [`MANUFACTURER_PROPERTY`]
    pub manufacturer: Option<String>,
}

impl DeviceProfile {
    /// Reads the profile of the running device.
    ///
    /// Off Android no properties exist and the profile is empty.
    pub fn detect() -> DeviceProfile {
        let profile = DeviceProfile {
            qemu: system_property(QEMU_PROPERTY),
            manufacturer: system_property(MANUFACTURER_PROPERTY),
        };
        debug!(?profile, "Detected device profile");
        profile
    }

    /// Whether the GPU is emulated, either by the SDK emulator or by Genymotion
    pub fn is_emulator(&self) -> bool {
        let qemu = self
            .qemu
            .as_deref()
            .map_or(false, |value| !value.is_empty() && value != "0");
        let genymotion = self
            .manufacturer
            .as_deref()
            .map_or(false, |value| value.contains("Genymotion"));
        qemu || genymotion
    }
}

#[cfg(target_os = "android")]
const PROP_VALUE_MAX: usize = 92;

/// Reads an Android system property, `None` if it is unset or empty
#[cfg(target_os = "android")]
pub fn system_property(name: &str) -> Option<String> {
    let name = CString::new(name).ok()?;
    let mut value = [0 as libc::c_char; PROP_VALUE_MAX];
    let len = unsafe { libc::__system_property_get(name.as_ptr(), value.as_mut_ptr()) };
    if len <= 0 {
        return None;
    }
    // SAFETY: the property API always nul-terminates within PROP_VALUE_MAX
    let value = unsafe { CStr::from_ptr(value.as_ptr()) };
    Some(value.to_string_lossy().into_owned())
}

/// Reads an Android system property, `None` if it is unset or empty
#[cfg(not(target_os = "android"))]
pub fn system_property(_name: &str) -> Option<String> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(qemu: Option<&str>, manufacturer: Option<&str>) -> DeviceProfile {
        DeviceProfile {
            qemu: qemu.map(str::to_owned),
            manufacturer: manufacturer.map(str::to_owned),
        }
    }

    #[test]
    fn emulator_detection() {
        assert!(profile(Some("1"), Some("Google")).is_emulator());
        assert!(profile(None, Some("Genymotion")).is_emulator());
        assert!(profile(None, Some("Genymotion Inc.")).is_emulator());
        assert!(!profile(Some("0"), Some("samsung")).is_emulator());
        assert!(!profile(Some(""), None).is_emulator());
        assert!(!DeviceProfile::default().is_emulator());
    }

    #[cfg(not(target_os = "android"))]
    #[test]
    fn no_properties_off_android() {
        assert_eq!(DeviceProfile::detect(), DeviceProfile::default());
    }
}
