use std::fmt;

/// Logical window identity: a name plus an instance number.
///
/// Ordered by name, then number, so it can key an ordered map. Independent of
/// whatever native window currently backs it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WindowHandle {
    name: String,
    number: u32,
}

impl WindowHandle {
    pub fn new(name: impl Into<String>) -> Self {
        Self::numbered(name, 0)
    }

    pub fn numbered(name: impl Into<String>, number: u32) -> Self {
        Self {
            name: name.into(),
            number,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    /// Title for the native window: the name, with the number appended when
    /// it is non-zero.
    pub fn title(&self) -> String {
        if self.number > 0 {
            format!("{} {}", self.name, self.number)
        } else {
            self.name.clone()
        }
    }
}

impl From<&str> for WindowHandle {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl fmt::Display for WindowHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.name, self.number)
    }
}

/// Platform-assigned identifier of a created window. Only meaningful while
/// that window is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NativeId(pub u64);

impl fmt::Display for NativeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "native:{:#x}", self.0)
    }
}
