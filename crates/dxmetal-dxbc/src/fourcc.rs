use core::fmt;

/// A four-character chunk identifier (e.g. `DXBC`, `RDEF`, `ISGN`).
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct FourCC(pub [u8; 4]);

impl FourCC {
    /// Returns the identifier as a `str` if all four bytes are printable
    /// ASCII, otherwise `None`.
    pub fn as_str(&self) -> Option<&str> {
        if self.0.iter().all(|&b| (0x20..0x7F).contains(&b)) {
            core::str::from_utf8(&self.0).ok()
        } else {
            None
        }
    }
}

impl fmt::Display for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_str() {
            Some(s) => f.write_str(s),
            None => write!(
                f,
                "{:02x}{:02x}{:02x}{:02x}",
                self.0[0], self.0[1], self.0[2], self.0[3]
            ),
        }
    }
}

impl fmt::Debug for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FourCC({self})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn printable_fourcc_displays_ascii() {
        assert_eq!(FourCC(*b"RDEF").to_string(), "RDEF");
    }

    #[test]
    fn non_printable_fourcc_displays_hex() {
        assert_eq!(FourCC([0x01, 0x02, 0xFF, 0x41]).to_string(), "0102ff41");
    }
}
