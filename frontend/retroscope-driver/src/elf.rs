//! Minimal ELF inspection: the bounds of the target program's code.
//!
//! Used to decide whether a configured ELF is usable at all and whether a code
//! address can plausibly resolve before the symbolizer child is asked. Only
//! the headers are parsed; both ELF classes and both byte orders are
//! accepted since m68k toolchains emit big-endian objects.

use std::fs;
use std::path::Path;

const EI_NIDENT: usize = 16;
const EI_CLASS: usize = 4;
const EI_DATA: usize = 5;

const ELFCLASS32: u8 = 1;
const ELFCLASS64: u8 = 2;
const ELFDATA2LSB: u8 = 1;

const SHN_XINDEX: u16 = 0xFFFF;
const PN_XNUM: u16 = 0xFFFF;

const PT_LOAD: u32 = 1;
const PF_X: u32 = 0x1;

/// `[lo, hi)` bounds of the program's executable code: the `.text` section
/// when one exists, otherwise the union of executable `PT_LOAD` segments.
pub fn text_bounds(elf_path: &Path) -> Option<(u64, u64)> {
    let bytes = match fs::read(elf_path) {
        Ok(bytes) => bytes,
        Err(err) => {
            log::debug!("Failed to read ELF '{}': {err}", elf_path.display());
            return None;
        }
    };

    if bytes.len() < EI_NIDENT || bytes[..4] != [0x7F, b'E', b'L', b'F'] {
        return None;
    }

    let reader = Reader { bytes: &bytes, little_endian: bytes[EI_DATA] == ELFDATA2LSB };
    match bytes[EI_CLASS] {
        ELFCLASS32 => bounds_for_class(&reader, &Layout::CLASS32),
        ELFCLASS64 => bounds_for_class(&reader, &Layout::CLASS64),
        _ => None,
    }
}

struct Reader<'a> {
    bytes: &'a [u8],
    little_endian: bool,
}

impl Reader<'_> {
    fn u16_at(&self, offset: u64) -> Option<u16> {
        let offset = usize::try_from(offset).ok()?;
        let raw: [u8; 2] = self.bytes.get(offset..offset + 2)?.try_into().ok()?;
        Some(if self.little_endian { u16::from_le_bytes(raw) } else { u16::from_be_bytes(raw) })
    }

    fn u32_at(&self, offset: u64) -> Option<u32> {
        let offset = usize::try_from(offset).ok()?;
        let raw: [u8; 4] = self.bytes.get(offset..offset + 4)?.try_into().ok()?;
        Some(if self.little_endian { u32::from_le_bytes(raw) } else { u32::from_be_bytes(raw) })
    }

    fn u64_at(&self, offset: u64) -> Option<u64> {
        let offset = usize::try_from(offset).ok()?;
        let raw: [u8; 8] = self.bytes.get(offset..offset + 8)?.try_into().ok()?;
        Some(if self.little_endian { u64::from_le_bytes(raw) } else { u64::from_be_bytes(raw) })
    }

    /// Word-sized field: u32 in ELFCLASS32, u64 in ELFCLASS64.
    fn word_at(&self, offset: u64, layout: &Layout) -> Option<u64> {
        if layout.is_64 { self.u64_at(offset) } else { self.u32_at(offset).map(u64::from) }
    }

    fn name_at(&self, strtab: (u64, u64), index: u32) -> Option<&str> {
        let (table_offset, table_size) = strtab;
        let start = usize::try_from(table_offset + u64::from(index)).ok()?;
        let end = usize::try_from(table_offset + table_size).ok()?;
        let slice = self.bytes.get(start..end.min(self.bytes.len()))?;
        let nul = slice.iter().position(|&byte| byte == 0)?;
        std::str::from_utf8(&slice[..nul]).ok()
    }
}

/// Field offsets that differ between the two ELF classes.
struct Layout {
    is_64: bool,
    e_phoff: u64,
    e_shoff: u64,
    e_phentsize: u64,
    e_phnum: u64,
    e_shentsize: u64,
    e_shnum: u64,
    e_shstrndx: u64,
    sh_addr: u64,
    sh_offset: u64,
    sh_size: u64,
    sh_link: u64,
    sh_info: u64,
    p_flags: u64,
    p_vaddr: u64,
    p_memsz: u64,
}

impl Layout {
    const CLASS32: Self = Self {
        is_64: false,
        e_phoff: 0x1C,
        e_shoff: 0x20,
        e_phentsize: 0x2A,
        e_phnum: 0x2C,
        e_shentsize: 0x2E,
        e_shnum: 0x30,
        e_shstrndx: 0x32,
        sh_addr: 0x0C,
        sh_offset: 0x10,
        sh_size: 0x14,
        sh_link: 0x18,
        sh_info: 0x1C,
        p_flags: 0x18,
        p_vaddr: 0x08,
        p_memsz: 0x14,
    };

    const CLASS64: Self = Self {
        is_64: true,
        e_phoff: 0x20,
        e_shoff: 0x28,
        e_phentsize: 0x36,
        e_phnum: 0x38,
        e_shentsize: 0x3A,
        e_shnum: 0x3C,
        e_shstrndx: 0x3E,
        sh_addr: 0x10,
        sh_offset: 0x18,
        sh_size: 0x20,
        sh_link: 0x28,
        sh_info: 0x2C,
        p_flags: 0x04,
        p_vaddr: 0x10,
        p_memsz: 0x28,
    };
}

fn bounds_for_class(reader: &Reader<'_>, layout: &Layout) -> Option<(u64, u64)> {
    let sh_offset = reader.word_at(layout.e_shoff, layout)?;
    let sh_entsize = u64::from(reader.u16_at(layout.e_shentsize)?);
    if sh_offset == 0 || sh_entsize == 0 {
        return None;
    }

    let mut sh_num = u64::from(reader.u16_at(layout.e_shnum)?);
    let mut sh_strndx = u64::from(reader.u16_at(layout.e_shstrndx)?);

    // Extended section numbering stores the real counts in section 0
    if sh_num == 0 || sh_strndx == u64::from(SHN_XINDEX) {
        if sh_num == 0 {
            sh_num = reader.word_at(sh_offset + layout.sh_size, layout)?;
        }
        if sh_strndx == u64::from(SHN_XINDEX) {
            sh_strndx = u64::from(reader.u32_at(sh_offset + layout.sh_link)?);
        }
    }
    if sh_num == 0 || sh_strndx >= sh_num {
        return None;
    }

    let strtab_header = sh_offset + sh_strndx * sh_entsize;
    let strtab = (
        reader.word_at(strtab_header + layout.sh_offset, layout)?,
        reader.word_at(strtab_header + layout.sh_size, layout)?,
    );

    for section in 0..sh_num {
        let header = sh_offset + section * sh_entsize;
        let name_index = reader.u32_at(header)?;
        let Some(name) = reader.name_at(strtab, name_index) else {
            continue;
        };

        if name == ".text" || name.starts_with(".text.") {
            let lo = reader.word_at(header + layout.sh_addr, layout)?;
            let hi = lo + reader.word_at(header + layout.sh_size, layout)?;
            if lo != 0 && hi > lo {
                return Some((lo, hi));
            }
            break;
        }
    }

    // No usable .text section: take the union of executable load segments
    let ph_offset = reader.word_at(layout.e_phoff, layout)?;
    let ph_entsize = u64::from(reader.u16_at(layout.e_phentsize)?);
    let mut ph_num = u64::from(reader.u16_at(layout.e_phnum)?);
    if ph_num == u64::from(PN_XNUM) {
        ph_num = u64::from(reader.u32_at(sh_offset + layout.sh_info)?);
    }
    if ph_offset == 0 || ph_entsize == 0 || ph_num == 0 {
        return None;
    }

    let mut lo = 0_u64;
    let mut hi = 0_u64;
    for segment in 0..ph_num {
        let header = ph_offset + segment * ph_entsize;
        let p_type = reader.u32_at(header)?;
        let p_flags = reader.u32_at(header + layout.p_flags)?;
        if p_type != PT_LOAD || p_flags & PF_X == 0 {
            continue;
        }

        let vaddr = reader.word_at(header + layout.p_vaddr, layout)?;
        let end = vaddr + reader.word_at(header + layout.p_memsz, layout)?;
        if lo == 0 || vaddr < lo {
            lo = vaddr;
        }
        if end > hi {
            hi = end;
        }
    }

    (lo != 0 && hi > lo).then_some((lo, hi))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::path::PathBuf;

    struct Elf32Builder {
        bytes: Vec<u8>,
    }

    impl Elf32Builder {
        fn new() -> Self {
            Self { bytes: Vec::new() }
        }

        fn u16(&mut self, value: u16) {
            self.bytes.extend_from_slice(&value.to_le_bytes());
        }

        fn u32(&mut self, value: u32) {
            self.bytes.extend_from_slice(&value.to_le_bytes());
        }

        fn section(&mut self, name: u32, sh_type: u32, addr: u32, offset: u32, size: u32) {
            self.u32(name);
            self.u32(sh_type);
            self.u32(0); // flags
            self.u32(addr);
            self.u32(offset);
            self.u32(size);
            self.u32(0); // link
            self.u32(0); // info
            self.u32(0); // addralign
            self.u32(0); // entsize
        }

        fn program_header(&mut self, p_type: u32, vaddr: u32, memsz: u32, flags: u32) {
            self.u32(p_type);
            self.u32(0); // offset
            self.u32(vaddr);
            self.u32(vaddr); // paddr
            self.u32(memsz); // filesz
            self.u32(memsz);
            self.u32(flags);
            self.u32(0); // align
        }
    }

    const EHSIZE: u32 = 52;
    const SHENTSIZE: u16 = 40;
    const PHENTSIZE: u16 = 32;

    fn header(builder: &mut Elf32Builder, phoff: u32, phnum: u16, shoff: u32, shnum: u16, shstrndx: u16) {
        builder.bytes.extend_from_slice(&[0x7F, b'E', b'L', b'F', 1, 1, 1]);
        builder.bytes.resize(EI_NIDENT, 0);
        builder.u16(2); // e_type: executable
        builder.u16(4); // e_machine: m68k
        builder.u32(1); // e_version
        builder.u32(0x1000); // e_entry
        builder.u32(phoff);
        builder.u32(shoff);
        builder.u32(0); // e_flags
        builder.u16(EHSIZE as u16);
        builder.u16(PHENTSIZE);
        builder.u16(phnum);
        builder.u16(SHENTSIZE);
        builder.u16(shnum);
        builder.u16(shstrndx);
    }

    fn write_temp(name: &str, bytes: &[u8]) -> PathBuf {
        let path = env::temp_dir().join(format!("retroscope-elf-{name}-{}", std::process::id()));
        fs::write(&path, bytes).unwrap();
        path
    }

    #[test]
    fn finds_text_section_bounds() {
        let strtab = b"\0.text\0.shstrtab\0";
        let strtab_offset = EHSIZE;
        let shoff = strtab_offset + strtab.len() as u32;

        let mut builder = Elf32Builder::new();
        header(&mut builder, 0, 0, shoff, 3, 2);
        builder.bytes.extend_from_slice(strtab);
        builder.section(0, 0, 0, 0, 0);
        builder.section(1, 1, 0x1000, 0, 0x200); // .text
        builder.section(7, 3, 0, strtab_offset, strtab.len() as u32); // .shstrtab

        let path = write_temp("text", &builder.bytes);
        assert_eq!(text_bounds(&path), Some((0x1000, 0x1200)));
        fs::remove_file(&path).ok();
    }

    #[test]
    fn falls_back_to_executable_load_segments() {
        let strtab = b"\0.shstrtab\0";
        let strtab_offset = EHSIZE;
        let phoff = strtab_offset + strtab.len() as u32;
        let shoff = phoff + 2 * u32::from(PHENTSIZE);

        let mut builder = Elf32Builder::new();
        header(&mut builder, phoff, 2, shoff, 2, 1);
        builder.bytes.extend_from_slice(strtab);
        builder.program_header(PT_LOAD, 0x400, 0x100, PF_X | 0x4);
        builder.program_header(PT_LOAD, 0x2000, 0x80, 0x6); // data, not executable
        builder.section(0, 0, 0, 0, 0);
        builder.section(1, 3, 0, strtab_offset, strtab.len() as u32);

        let path = write_temp("segments", &builder.bytes);
        assert_eq!(text_bounds(&path), Some((0x400, 0x500)));
        fs::remove_file(&path).ok();
    }

    #[test]
    fn rejects_non_elf_files() {
        let path = write_temp("garbage", b"definitely not an elf");
        assert_eq!(text_bounds(&path), None);
        fs::remove_file(&path).ok();

        assert_eq!(text_bounds(Path::new("/nonexistent/file.elf")), None);
    }
}
