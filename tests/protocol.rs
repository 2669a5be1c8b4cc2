//! Protocol level tests against the simulated target.

use core::ops::ControlFlow;

use sinowealth_dumper::cable::sim::{SimMode, SimTarget};
use sinowealth_dumper::chip::ChipConfig;
use sinowealth_dumper::dump::Method;
use sinowealth_dumper::dumper::{Dumper, Mode, CHUNK_SIZE};
use sinowealth_dumper::Error;

/// Flash where every byte holds its own address plus one
fn counting_flash(size: u32) -> Vec<u8> {
    (0..size).map(|x| (x + 1) as u8).collect()
}

fn connect(target: SimTarget, chip: ChipConfig) -> Dumper<SimTarget> {
    let mut dumper = Dumper::new(target, chip).expect("new");
    dumper.connect().expect("connect");
    dumper
}

#[test]
fn check_icp_with_echoing_target() {
    let mut dumper = connect(SimTarget::new(), ChipConfig::default());
    assert_eq!(dumper.check_icp(), Ok(true));
    assert_eq!(dumper.cable().offset(), 0xFF69);
}

#[test]
fn check_icp_with_wrong_echo() {
    let mut target = SimTarget::new();
    target.echo_fault = true;
    let mut dumper = connect(target, ChipConfig::default());
    assert_eq!(dumper.check_icp(), Ok(false));
}

#[test]
fn check_jtag_rejects_floating_bus() {
    let mut target = SimTarget::new();
    target.id_code = 0xFFFF;
    let mut dumper = connect(target, ChipConfig::default());
    assert_eq!(dumper.check_jtag(), Ok(false));
}

#[test]
fn check_jtag_rejects_grounded_bus() {
    let mut target = SimTarget::new();
    target.id_code = 0x0000;
    let mut dumper = connect(target, ChipConfig::default());
    assert_eq!(dumper.check_jtag(), Ok(false));
}

#[test]
fn check_jtag_accepts_real_id() {
    let mut target = SimTarget::new();
    target.id_code = 0x1234;
    let mut dumper = connect(target, ChipConfig::default());
    assert_eq!(dumper.get_id(), Ok(0x1234));
    assert_eq!(dumper.check_jtag(), Ok(true));
    assert_eq!(dumper.mode(), Mode::Jtag);
}

#[test]
fn switch_mode_twice_is_free() {
    let mut dumper = connect(SimTarget::new(), ChipConfig::default());
    for mode in [Mode::Icp, Mode::Jtag, Mode::Ready] {
        dumper.switch_mode(mode).unwrap();
        let before = dumper.cable().transitions();
        dumper.switch_mode(mode).unwrap();
        assert_eq!(dumper.cable().transitions(), before, "{mode:?}");
    }
}

#[test]
fn icp_read_returns_flash() {
    let flash: Vec<u8> = (0..0x8000u32).map(|x| (x * 7 >> 3) as u8).collect();
    let mut dumper = connect(SimTarget::with_flash(flash.clone()), ChipConfig::default());
    assert_eq!(dumper.check_icp(), Ok(true));

    let mut chunk = [0; CHUNK_SIZE];
    dumper.read_flash_icp(&mut chunk, 0x4321, false).unwrap();
    assert_eq!(chunk[..], flash[0x4321..0x4321 + CHUNK_SIZE]);
    assert_eq!(dumper.mode(), Mode::Ready);
    assert_eq!(dumper.cable().mode(), SimMode::Ready);
}

#[test]
fn jtag_read_skips_pipeline_cycle() {
    let target = SimTarget::with_flash(counting_flash(0x8000));
    let mut dumper = connect(target, ChipConfig::default());

    let address = 0x0123;
    let mut chunk = [0; CHUNK_SIZE];
    dumper.read_flash_jtag(&mut chunk, address, false).unwrap();
    for (i, byte) in chunk.iter().enumerate() {
        assert_eq!(*byte, (address + i as u32 + 1) as u8, "byte {i}");
    }

    // one cycle per byte plus the one whose data is thrown away
    let latched = &dumper.cable().latched;
    assert_eq!(latched.len(), CHUNK_SIZE + 1);
    assert_eq!(latched[0], 0x0123);
    assert_eq!(*latched.last().unwrap(), 0x0123 + CHUNK_SIZE as u16);
}

#[test]
fn jtag_read_selects_bank() {
    let chip = ChipConfig::new(2, 0x10000);
    let target = SimTarget::with_flash(counting_flash(0x10000));
    let mut dumper = connect(target, chip);

    let mut chunk = [0; CHUNK_SIZE];
    dumper.read_flash_jtag(&mut chunk, 0x9000, false).unwrap();

    let target = dumper.cable();
    assert_eq!(target.bank(), 1);
    assert_eq!(target.latched[0], 0x1000);

    let exec: Vec<u32> = target
        .dr_writes
        .iter()
        .filter(|w| w.instruction == 4)
        .map(|w| w.value)
        .collect();
    let expected: Vec<u32> = [0x74u8, 0x01, 0xF5, 0xB7]
        .iter()
        .map(|b| b.reverse_bits() as u32)
        .collect();
    assert_eq!(exec, expected);
    assert_eq!(exec, [0x2E, 0x80, 0xAF, 0xED]);

    // bank switch comes before the read instruction
    assert_eq!(target.instructions[target.instructions.len() - 2..], [4, 12]);

    for (i, byte) in chunk.iter().enumerate() {
        assert_eq!(*byte, (0x9000 + i as u32 + 1) as u8);
    }
}

#[test]
fn jtag_read_across_bank_edge() {
    let chip = ChipConfig::new(2, 0x10000);
    let target = SimTarget::with_flash(counting_flash(0x10000));
    let mut dumper = connect(target, chip);

    let mut chunk = [0; CHUNK_SIZE];
    dumper.read_flash_jtag(&mut chunk, 0x7FF8, false).unwrap();
    for (i, byte) in chunk.iter().enumerate() {
        assert_eq!(*byte, (0x7FF8 + i as u32 + 1) as u8);
    }

    let target = dumper.cable();
    assert_eq!(target.bank(), 1);
    // eight bytes from the end of bank 0, then eight from the start of bank 1, each with its
    // extra pipeline cycle
    assert_eq!(target.latched.len(), 2 * (CHUNK_SIZE / 2 + 1));
    assert_eq!(target.latched[0], 0x7FF8);
    assert_eq!(target.latched[CHUNK_SIZE / 2 + 1], 0x0000);
    assert!(target.latched.iter().all(|&a| a <= 0x8000));
}

#[test]
fn jtag_refuses_custom_block() {
    let mut dumper = connect(SimTarget::new(), ChipConfig::default());
    let before = dumper.cable().transitions();
    let mut chunk = [0; CHUNK_SIZE];
    assert_eq!(dumper.read_flash_jtag(&mut chunk, 0, true), Err(Error::Unsupported));
    assert_eq!(dumper.cable().transitions(), before);
    assert_eq!(dumper.mode(), Mode::Ready);
}

#[test]
fn dump_whole_image_over_icp() {
    let chip = ChipConfig::new(2, 4096 + 8);
    let flash: Vec<u8> = (0..chip.flash_size).map(|x| (x ^ x >> 8) as u8).collect();
    let mut dumper = connect(SimTarget::with_flash(flash.clone()), chip);

    let mut image = Vec::new();
    let total = dumper
        .dump(Method::Icp, |address, chunk| {
            assert_eq!(address as usize, image.len());
            image.extend_from_slice(chunk);
            ControlFlow::Continue(())
        })
        .unwrap();
    assert_eq!(total, chip.flash_size);
    assert_eq!(image, flash);
}

#[test]
fn dump_whole_image_over_jtag() {
    let chip = ChipConfig::new(2, 0x10000);
    let flash: Vec<u8> = (0..chip.flash_size).map(|x| (x * 13 >> 2) as u8).collect();
    let mut dumper = connect(SimTarget::with_flash(flash.clone()), chip);

    let mut image = Vec::new();
    dumper
        .dump(Method::Jtag, |_, chunk| {
            image.extend_from_slice(chunk);
            ControlFlow::Continue(())
        })
        .unwrap();
    assert_eq!(image, flash);
}

#[test]
fn dump_stops_when_asked() {
    let mut dumper = connect(SimTarget::new(), ChipConfig::default());
    let mut calls = 0;
    let total = dumper
        .dump(Method::Icp, |_, _| {
            calls += 1;
            if calls == 3 {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        })
        .unwrap();
    assert_eq!(calls, 3);
    assert_eq!(total, 3 * CHUNK_SIZE as u32);
}

#[test]
fn dump_needs_a_live_session() {
    let mut target = SimTarget::new();
    target.echo_fault = true;
    let mut dumper = connect(target, ChipConfig::default());
    let result = dumper.dump(Method::Icp, |_, _| panic!("no data expected"));
    assert_eq!(result, Err(Error::NoSession));
}

#[test]
fn dump_before_connect() {
    let mut dumper = Dumper::new(SimTarget::new(), ChipConfig::default()).unwrap();
    let result = dumper.dump(Method::Jtag, |_, _| ControlFlow::Continue(()));
    assert_eq!(result, Err(Error::Disconnected));
    assert_eq!(dumper.cable().mode(), SimMode::Off);
}
