//! The `/P` permission bits of the standard security handler.

use bitflags::bitflags;

bitflags! {
    /// User access permissions. Bit positions follow the file format
    /// (bit 3 is the 0x04 bit); all bits outside the defined set must
    /// read as 1, which is why the raw form below fills them in.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Permissions: u32 {
        const PRINT             = 1 << 2;
        const MODIFY_CONTENTS   = 1 << 3;
        const COPY_CONTENTS     = 1 << 4;
        const MODIFY_ANNOTATIONS = 1 << 5;
        const FILL_FORMS        = 1 << 8;
        const EXTRACT_FOR_ACCESSIBILITY = 1 << 9;
        const ASSEMBLE_DOCUMENT = 1 << 10;
        const PRINT_HIGH_QUALITY = 1 << 11;
    }
}

impl Permissions {
    /// Everything allowed.
    pub fn all_allowed() -> Self {
        Permissions::all()
    }

    /// The signed 32-bit value stored in `/P`: undefined bits forced
    /// to 1, bits 1-2 forced to 0.
    pub fn to_p_value(self) -> i64 {
        let raw = self.bits() | !Permissions::all().bits() & !0b11;
        raw as i32 as i64
    }

    /// Read a `/P` value, ignoring the reserved bits.
    pub fn from_p_value(value: i64) -> Self {
        Permissions::from_bits_truncate(value as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_p_value_round_trip() {
        let perms = Permissions::PRINT | Permissions::COPY_CONTENTS;
        let p = perms.to_p_value();
        assert!(p < 0); // high reserved bits make it negative
        assert_eq!(Permissions::from_p_value(p), perms);
    }

    #[test]
    fn test_all_allowed_p_value() {
        let p = Permissions::all_allowed().to_p_value();
        assert_eq!(p as u32 & 0b11, 0);
        assert_eq!(Permissions::from_p_value(p), Permissions::all());
    }
}
