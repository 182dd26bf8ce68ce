mod common;

use common::{RomBuilder, console};
use dotmatrix_core::persist::{MemoryStore, SaveSlot, SaveStore};

fn banked(title: &str, cart_type: u8, rom_code: u8, ram_code: u8) -> Vec<u8> {
    RomBuilder::new(title)
        .kind(cart_type, rom_code, ram_code)
        .stamp_banks()
        .code(&[0x18, 0xFE])
        .build()
}

#[test]
fn mbc1_upper_bits_extend_the_bank() {
    let (mut gc, _) = console(banked("MBC1", 0x01, 5, 0));
    assert_eq!(gc.bus.read(0x4000), 1);
    gc.bus.write(0x2000, 0x05);
    assert_eq!(gc.bus.read(0x4000), 5);
    // Bank 0x20 is unreachable; the zero check on the low bits lands on 0x21.
    gc.bus.write(0x4000, 0x01);
    gc.bus.write(0x2000, 0x00);
    assert_eq!(gc.bus.read(0x4000), 0x21);
}

#[test]
fn mbc5_can_map_bank_zero_high() {
    let (mut gc, _) = console(banked("MBC5", 0x19, 3, 0));
    gc.bus.write(0x2000, 0x00);
    assert_eq!(gc.bus.read(0x4000), 0);
    gc.bus.write(0x2000, 0x0F);
    assert_eq!(gc.bus.read(0x4000), 15);
}

#[test]
fn mbc2_ram_holds_nibbles() {
    let (mut gc, _) = console(banked("MBC2", 0x06, 2, 0));
    gc.bus.write(0x0000, 0x0A);
    gc.bus.write(0xA000, 0x5A);
    assert_eq!(gc.bus.read(0xA000), 0xFA);
    assert_eq!(gc.bus.read(0xA200), 0xFA);
    // Address bit 8 set selects the ROM bank register instead.
    gc.bus.write(0x2100, 0x03);
    assert_eq!(gc.bus.read(0x4000), 3);
}

#[test]
fn mbc3_battery_and_clock_are_stored_separately() {
    // MBC3+TIMER+RAM+BATTERY, 32 KiB RAM
    let (mut gc, _) = console(banked("MBC3RTC", 0x10, 2, 3));
    gc.bus.write(0x0000, 0x0A);
    gc.bus.write(0x4000, 0x02);
    gc.bus.write(0xA123, 0x77);

    let mut store = MemoryStore::new();
    assert!(gc.save_battery(&mut store).unwrap());
    let id = gc.cartridge_id().unwrap();
    let ram = store.load(id, SaveSlot::Battery).unwrap();
    assert_eq!(ram.len(), 0x8000);
    assert_eq!(ram[2 * 0x2000 + 0x123], 0x77);
    let rtc = store.load(id, SaveSlot::Rtc).unwrap();
    assert_eq!(&rtc[..4], b"RTC1");
}
