use dotmatrix_core::Cartridge;
use dotmatrix_core::mmu::{Bus, Mmu};
use dotmatrix_core::sink::NullFrameSink;

fn mmu(cgb: bool) -> Mmu {
    let mut rom = vec![0; 0x8000];
    rom[0x4000] = 0xAB;
    Mmu::new(Cartridge::new(rom).unwrap(), cgb)
}

#[test]
fn cartridge_regions_are_routed() {
    let mut mmu = mmu(false);
    assert_eq!(mmu.read_byte(0x4000).unwrap(), 0xAB);
    assert_eq!(mmu.read_byte(0xA000).unwrap(), 0xFF);
}

#[test]
fn vram_banks_on_cgb() {
    let mut mmu = mmu(true);
    mmu.write_byte(0x8000, 0x11).unwrap();
    mmu.write_byte(0xFF4F, 0x01).unwrap();
    assert_eq!(mmu.read_byte(0xFF4F).unwrap(), 0xFF);
    assert_eq!(mmu.read_byte(0x8000).unwrap(), 0x00);
    mmu.write_byte(0x9FFF, 0x22).unwrap();
    mmu.write_byte(0xFF4F, 0x00).unwrap();
    assert_eq!(mmu.read_byte(0xFF4F).unwrap(), 0xFE);
    assert_eq!(mmu.read_byte(0x8000).unwrap(), 0x11);
    assert_eq!(mmu.read_byte(0x9FFF).unwrap(), 0x00);
}

#[test]
fn dmg_has_single_vram_bank() {
    let mut mmu = mmu(false);
    mmu.write_byte(0x8000, 0x11).unwrap();
    mmu.write_byte(0xFF4F, 0x01).unwrap();
    assert_eq!(mmu.read_byte(0x8000).unwrap(), 0x11);
    assert_eq!(mmu.read_byte(0xFF4F).unwrap(), 0xFF);
}

#[test]
fn hdma_copies_into_vram() {
    let mut mmu = mmu(true);
    for i in 0..0x20u16 {
        mmu.write_byte(0xC000 + i, i as u8 + 1).unwrap();
    }
    mmu.write_byte(0xFF51, 0xC0).unwrap();
    mmu.write_byte(0xFF52, 0x00).unwrap();
    mmu.write_byte(0xFF53, 0x00).unwrap();
    mmu.write_byte(0xFF54, 0x40).unwrap();
    mmu.write_byte(0xFF55, 0x01).unwrap();
    assert_eq!(mmu.read_byte(0xFF55).unwrap(), 0x01);

    mmu.tick_vram_dma(4).unwrap();
    assert_eq!(mmu.read_byte(0xFF55).unwrap(), 0xFF);
    assert_eq!(mmu.read_byte(0x8040).unwrap(), 0x01);
    assert_eq!(mmu.read_byte(0x805F).unwrap(), 0x20);
}

#[test]
fn hdma_registers_absent_on_dmg() {
    let mut mmu = mmu(false);
    mmu.write_byte(0xFF55, 0x01).unwrap();
    assert_eq!(mmu.read_byte(0xFF55).unwrap(), 0xFF);
    assert!(!mmu.vram_dma.is_active());
}

#[test]
fn oam_dma_runs_byte_per_cycle() {
    let mut mmu = mmu(false);
    for i in 0..0xA0u16 {
        mmu.write_byte(0xD000 + i, 0xA0 - i as u8).unwrap();
    }
    mmu.write_byte(0xFF46, 0xD0).unwrap();
    mmu.tick_oam_dma(8).unwrap();
    assert_eq!(mmu.read_byte(0xFE07).unwrap(), 0x99);
    assert_eq!(mmu.read_byte(0xFE08).unwrap(), 0x00);

    // a second trigger is ignored until the first finishes
    mmu.write_byte(0xFF46, 0xC0).unwrap();
    mmu.tick_oam_dma(0x200).unwrap();
    assert_eq!(mmu.read_byte(0xFE9F).unwrap(), 0x01);
    assert_eq!(mmu.read_byte(0xFF46).unwrap(), 0xD0);
}

#[test]
fn cgb_palette_ports() {
    let mut mmu = mmu(true);
    mmu.write_byte(0xFF68, 0x80).unwrap();
    mmu.write_byte(0xFF69, 0x1F).unwrap();
    mmu.write_byte(0xFF69, 0x00).unwrap();
    assert_eq!(mmu.read_byte(0xFF68).unwrap(), 0xC2);
    mmu.write_byte(0xFF68, 0x00).unwrap();
    assert_eq!(mmu.read_byte(0xFF69).unwrap(), 0x1F);

    mmu.write_byte(0xFF6A, 0x01).unwrap();
    mmu.write_byte(0xFF6B, 0x7C).unwrap();
    assert_eq!(mmu.read_byte(0xFF6B).unwrap(), 0x7C);
    assert_eq!(mmu.read_byte(0xFF6A).unwrap(), 0x41);
}

#[test]
fn timer_interrupt_reaches_if() {
    let mut mmu = mmu(false);
    mmu.write_byte(0xFF0F, 0x00).unwrap();
    mmu.write_byte(0xFF06, 0xF0).unwrap();
    mmu.write_byte(0xFF05, 0xFF).unwrap();
    mmu.write_byte(0xFF07, 0x05).unwrap();
    assert_eq!(mmu.read_byte(0xFF07).unwrap(), 0xFD);
    mmu.tick_timer(15);
    assert_eq!(mmu.read_byte(0xFF0F).unwrap(), 0xE0);
    mmu.tick_timer(1);
    assert_eq!(mmu.read_byte(0xFF05).unwrap(), 0xF0);
    assert_eq!(mmu.read_byte(0xFF0F).unwrap(), 0xE4);
}

#[test]
fn joypad_port() {
    let mut mmu = mmu(false);
    mmu.write_byte(0xFF0F, 0x00).unwrap();
    mmu.write_byte(0xFF00, 0x10).unwrap();
    // A and Start pressed, read through the button group
    mmu.update_input(0x09);
    assert_eq!(mmu.read_byte(0xFF00).unwrap(), 0xD6);
    assert_eq!(mmu.read_byte(0xFF0F).unwrap() & 0x10, 0x10);
}

#[test]
fn vblank_reaches_if() {
    let mut mmu = mmu(false);
    mmu.write_byte(0xFF0F, 0x00).unwrap();
    let mut sink = NullFrameSink;
    for _ in 0..(144 * 456 / 4) {
        mmu.tick_ppu(4, &mut sink);
    }
    assert_eq!(mmu.read_byte(0xFF44).unwrap(), 144);
    assert_eq!(mmu.read_byte(0xFF0F).unwrap() & 0x01, 0x01);
}

#[test]
fn high_ram_and_key1() {
    let mut mmu = mmu(true);
    mmu.write_byte(0xFF80, 0x12).unwrap();
    mmu.write_byte(0xFFFE, 0x34).unwrap();
    assert_eq!(mmu.read_byte(0xFF80).unwrap(), 0x12);
    assert_eq!(mmu.read_byte(0xFFFE).unwrap(), 0x34);

    assert_eq!(mmu.read_byte(0xFF4D).unwrap(), 0x7E);
    mmu.write_byte(0xFF4D, 0x01).unwrap();
    assert_eq!(mmu.read_byte(0xFF4D).unwrap(), 0x7F);
}
