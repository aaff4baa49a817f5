//! Read-only view of the cartridge header at 0x0100-0x014F.

use std::ops::Range;

pub const HEADER_END: usize = 0x0150;

const LOGO: Range<usize> = 0x0104..0x0134;
const TITLE: Range<usize> = 0x0134..0x0143;
const MANUFACTURER: Range<usize> = 0x013F..0x0143;
const CGB_FLAG: usize = 0x0143;
const NEW_LICENSEE: Range<usize> = 0x0144..0x0146;
const SGB_FLAG: usize = 0x0146;
const CART_TYPE: usize = 0x0147;
const ROM_SIZE: usize = 0x0148;
const RAM_SIZE: usize = 0x0149;
const DESTINATION: usize = 0x014A;
const OLD_LICENSEE: usize = 0x014B;
const VERSION: usize = 0x014C;
const HEADER_CHECKSUM: usize = 0x014D;
const GLOBAL_CHECKSUM: usize = 0x014E;

// Bytes covered by the header checksum
const CHECKSUM_RANGE: Range<usize> = 0x0134..0x014D;

/// Borrowed header accessors. Out-of-range fields read as zero so a short
/// image can still be inspected.
#[derive(Debug, Clone, Copy)]
pub struct Header<'a> {
    data: &'a [u8],
}

impl<'a> Header<'a> {
    pub fn parse(data: &'a [u8]) -> Self {
        Self { data }
    }

    fn byte(&self, offset: usize) -> u8 {
        self.data.get(offset).copied().unwrap_or(0)
    }

    fn bytes(&self, range: Range<usize>) -> &'a [u8] {
        let end = range.end.min(self.data.len());
        let start = range.start.min(end);
        &self.data[start..end]
    }

    pub fn logo(&self) -> &'a [u8] {
        self.bytes(LOGO)
    }

    /// ASCII title, cut at the first NUL and trimmed.
    pub fn title(&self) -> String {
        let mut slice = self.bytes(TITLE);
        if let Some(pos) = slice.iter().position(|&b| b == 0) {
            slice = &slice[..pos];
        }
        String::from_utf8_lossy(slice).trim().to_string()
    }

    pub fn manufacturer_code(&self) -> &'a [u8] {
        self.bytes(MANUFACTURER)
    }

    pub fn cgb_flag(&self) -> u8 {
        self.byte(CGB_FLAG)
    }

    /// 0x80 (enhanced) or 0xC0 (CGB only).
    pub fn cgb_supported(&self) -> bool {
        matches!(self.cgb_flag(), 0x80 | 0xC0)
    }

    pub fn new_licensee_code(&self) -> &'a [u8] {
        self.bytes(NEW_LICENSEE)
    }

    pub fn sgb_flag(&self) -> u8 {
        self.byte(SGB_FLAG)
    }

    pub fn cart_type(&self) -> u8 {
        self.byte(CART_TYPE)
    }

    pub fn rom_size_code(&self) -> u8 {
        self.byte(ROM_SIZE)
    }

    pub fn ram_size_code(&self) -> u8 {
        self.byte(RAM_SIZE)
    }

    pub fn destination(&self) -> u8 {
        self.byte(DESTINATION)
    }

    pub fn old_licensee_code(&self) -> u8 {
        self.byte(OLD_LICENSEE)
    }

    pub fn version(&self) -> u8 {
        self.byte(VERSION)
    }

    pub fn header_checksum(&self) -> u8 {
        self.byte(HEADER_CHECKSUM)
    }

    pub fn global_checksum(&self) -> u16 {
        ((self.byte(GLOBAL_CHECKSUM) as u16) << 8) | self.byte(GLOBAL_CHECKSUM + 1) as u16
    }

    /// The boot ROM's check: `x = x - byte - 1` over 0x0134..=0x014C.
    pub fn computed_checksum(&self) -> u8 {
        CHECKSUM_RANGE.fold(0u8, |x, i| x.wrapping_sub(self.byte(i)).wrapping_sub(1))
    }

    pub fn checksum_ok(&self) -> bool {
        self.computed_checksum() == self.header_checksum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image() -> Vec<u8> {
        vec![0; HEADER_END]
    }

    #[test]
    fn zeroed_header_checksum() {
        let data = image();
        let header = Header::parse(&data);
        assert_eq!(header.computed_checksum(), 231);
        assert!(!header.checksum_ok());
    }

    #[test]
    fn title_stops_at_nul_and_trims() {
        let mut data = image();
        data[0x134..0x13D].copy_from_slice(b" TETRIS  ");
        data[0x13E] = b'X';
        assert_eq!(Header::parse(&data).title(), "TETRIS");
    }

    #[test]
    fn title_uses_all_fifteen_bytes() {
        let mut data = image();
        data[0x134..0x143].copy_from_slice(b"ABCDEFGHIJKLMNO");
        data[0x143] = 0x80;
        let header = Header::parse(&data);
        assert_eq!(header.title(), "ABCDEFGHIJKLMNO");
        assert!(header.cgb_supported());
    }

    #[test]
    fn populated_header_fields() {
        let mut data = image();
        data[0x134..0x13D].copy_from_slice(b"DOTMATRIX");
        data[0x144..0x146].copy_from_slice(b"01");
        data[0x147] = 0x1B;
        data[0x148] = 0x05;
        data[0x149] = 0x03;
        data[0x14A] = 0x01;
        data[0x14B] = 0x33;
        data[0x14C] = 0x02;
        data[0x14D] = 0x71;
        data[0x14E] = 0x91;
        data[0x14F] = 0xE6;
        let header = Header::parse(&data);
        assert_eq!(header.computed_checksum(), 0x71);
        assert!(header.checksum_ok());
        assert_eq!(header.global_checksum(), 0x91E6);
        assert_eq!(header.new_licensee_code(), b"01");
        assert_eq!(header.cart_type(), 0x1B);
        assert_eq!(header.version(), 2);
        assert_eq!(header.destination(), 1);
    }

    #[test]
    fn short_image_reads_zero() {
        let data = vec![0u8; 0x140];
        let header = Header::parse(&data);
        assert_eq!(header.cart_type(), 0);
        assert!(header.new_licensee_code().is_empty());
    }
}
