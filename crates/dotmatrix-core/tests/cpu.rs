use dotmatrix_core::mmu::Bus;
use dotmatrix_core::{Cartridge, Fault, GameBoy, Model};

fn machine(program: &[u8], model: Model) -> GameBoy {
    let mut rom = vec![0; 0x8000];
    rom[0x0100..0x0100 + program.len()].copy_from_slice(program);
    // VBlank handler: LD HL,0xC000 ; INC (HL) ; RETI
    rom[0x0040..0x0045].copy_from_slice(&[0x21, 0x00, 0xC0, 0x34, 0xD9]);
    GameBoy::new(Cartridge::new(rom).unwrap(), model)
}

#[test]
fn vblank_interrupt_wakes_halt() {
    // LD A,1 ; LDH (IE),A ; XOR A ; LDH (IF),A ; EI ; HALT ; JR -3
    let mut gb = machine(
        &[0x3E, 0x01, 0xE0, 0xFF, 0xAF, 0xE0, 0x0F, 0xFB, 0x76, 0x18, 0xFD],
        Model::Dmg,
    );
    while gb.frames() < 3 {
        gb.step().unwrap();
    }
    for _ in 0..16 {
        gb.step().unwrap();
    }
    assert_eq!(gb.mmu.read_byte(0xC000).unwrap(), 3);
    assert!(gb.cpu.halted);
}

#[test]
fn copy_loop_through_bus() {
    // LD HL,0x0150 ; LD DE,0xC100 ; LD B,4
    // loop: LD A,(HL+) ; LD (DE),A ; INC DE ; DEC B ; JR NZ,loop
    let mut program = vec![
        0x21, 0x50, 0x01, 0x11, 0x00, 0xC1, 0x06, 0x04, 0x2A, 0x12, 0x13, 0x05, 0x20, 0xFA,
    ];
    program.resize(0x50, 0x00);
    program.extend_from_slice(&[0xDE, 0xAD, 0xBE, 0xEF]);
    let mut gb = machine(&program, Model::Dmg);
    for _ in 0..3 + 4 * 5 {
        gb.step().unwrap();
    }
    assert_eq!(gb.cpu.regs.pc, 0x010E);
    let copied: Vec<u8> = (0..4)
        .map(|i| gb.mmu.read_byte(0xC100 + i).unwrap())
        .collect();
    assert_eq!(copied, [0xDE, 0xAD, 0xBE, 0xEF]);
}

#[test]
fn unknown_opcode_is_a_fault() {
    let mut gb = machine(&[0x00, 0xDD], Model::Dmg);
    gb.step().unwrap();
    let fault = gb.step().unwrap_err();
    assert_eq!(
        fault,
        Fault::UnknownOpcode {
            opcode: 0xDD,
            prefixed: false,
            pc: 0x0101
        }
    );
    assert_eq!(fault.to_string(), "unimplemented opcode 0xDD at PC 0x0101");
}

#[test]
fn post_boot_registers_follow_model() {
    let dmg = machine(&[], Model::Dmg);
    let cgb = machine(&[], Model::Cgb);
    assert_eq!(dmg.cpu.regs.af(), 0x01B0);
    assert_eq!(cgb.cpu.regs.af(), 0x11B0);
    assert_eq!(cgb.cpu.regs.sp, 0xFFFE);
    assert_eq!(cgb.cpu.regs.pc, 0x0100);
}

#[test]
fn speed_switch_through_key1() {
    // LD A,1 ; LDH (KEY1),A ; STOP ; NOP
    let mut gb = machine(&[0x3E, 0x01, 0xE0, 0x4D, 0x10, 0x00], Model::Cgb);
    for _ in 0..3 {
        gb.step().unwrap();
    }
    assert!(gb.cpu.double_speed);
    assert_eq!(gb.mmu.read_byte(0xFF4D).unwrap(), 0xFE);
}
