use std::vec;
use std::vec::Vec;

use flash_driver::command::{BLOCK_ERASE_64K, SECTOR_ERASE};
use flash_driver::crc::crc32;
use flash_driver::part::W25Q16JV;
use flash_driver::sim::SimFlashBus;
use flash_driver::{FlashDriver, FlashError};

use super::*;
use crate::layout::{DEFAULT_LAYOUT, DEFAULT_RAM_END};
use crate::metadata::METADATA_SIZE;

fn flash() -> FlashDriver<SimFlashBus> {
    let mut flash = FlashDriver::new(SimFlashBus::new(&W25Q16JV), W25Q16JV);
    flash.init().expect("init");
    flash.bus_mut().clear_ops();
    flash
}

fn config() -> UpdateConfig {
    UpdateConfig {
        enabled: true,
        ..UpdateConfig::default()
    }
}

fn manager(flash: &mut FlashDriver<SimFlashBus>) -> UpdateManager<'_, SimFlashBus> {
    let mut manager = UpdateManager::new(flash, config()).expect("layout");
    manager.init().expect("init");
    manager.flash().bus_mut().clear_ops();
    manager
}

/// An image whose vector table points at the top of RAM and into itself.
fn image(entry: u32, len: usize) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(len);
    bytes.extend_from_slice(&DEFAULT_RAM_END.to_le_bytes());
    bytes.extend_from_slice(&(entry + 0x101).to_le_bytes());
    bytes.extend((8..len).map(|i| (i * 7) as u8));
    bytes
}

fn plant_vectors(flash: &mut FlashDriver<SimFlashBus>, slot: Slot, sp: u32, reset: u32) {
    let at = DEFAULT_LAYOUT.slot(slot).application.offset as usize;
    let memory = flash.bus_mut().memory_mut();
    memory[at..at + 4].copy_from_slice(&sp.to_le_bytes());
    memory[at + 4..at + 8].copy_from_slice(&reset.to_le_bytes());
}

fn metadata_sector(flash: &mut FlashDriver<SimFlashBus>) -> Vec<u8> {
    let at = DEFAULT_LAYOUT.metadata as usize;
    flash.bus().memory()[at..at + METADATA_SIZE].to_vec()
}

/// Stages, commits and returns the image for slot B.
fn stage_slot_b(manager: &mut UpdateManager<'_, SimFlashBus>, len: usize) -> Vec<u8> {
    let payload = image(manager.slot_application_address(Slot::B), len);
    manager.erase_slot(Slot::B).expect("erase");
    manager
        .write_slot(Slot::B, SlotRegion::Application, 0, &payload)
        .expect("write");
    manager
        .commit_slot(Slot::B, 2, len as u32, crc32(&payload), 1_000)
        .expect("commit");
    payload
}

#[test]
fn blank_device_gets_default_metadata() {
    let mut flash = flash();
    let mut manager = UpdateManager::new(&mut flash, config()).expect("layout");

    manager.init().expect("init");

    assert_eq!(manager.current_slot(), Slot::A);
    assert_eq!(manager.upgrade_slot(), Slot::B);
    let metadata = *manager.metadata();
    assert!(metadata.slot_a.valid);
    assert_eq!(metadata.slot_a.version, 1);
    assert!(!metadata.slot_b.valid);
    assert!(metadata.rollback_enabled);
    assert_eq!(manager.load_metadata(), Ok(metadata));
    assert_eq!(
        manager.flash().bus().erases(),
        vec![(SECTOR_ERASE, DEFAULT_LAYOUT.metadata)]
    );
}

#[test]
fn fallback_defaults_do_not_claim_a_verified_checksum() {
    let mut flash = flash();
    let manager = manager(&mut flash);

    assert!(manager.metadata().slot_a.valid);
    assert!(!manager.metadata().slot_a.crc_valid);
}

#[test]
fn persisted_metadata_is_loaded_without_rewriting() {
    let mut flash = flash();
    {
        let mut manager = manager(&mut flash);
        manager.record_boot(42).expect("boot");
    }
    flash.bus_mut().clear_ops();

    let mut manager = UpdateManager::new(&mut flash, config()).expect("layout");
    manager.init().expect("init");

    assert_eq!(manager.metadata().boot_count, 1);
    assert_eq!(manager.metadata().boot_timestamp, 42);
    assert!(manager.flash().bus().erases().is_empty());
}

#[test]
fn corrupted_metadata_falls_back_to_defaults() {
    let mut flash = flash();
    {
        let mut manager = manager(&mut flash);
        manager.record_boot(42).expect("boot");
    }
    let at = DEFAULT_LAYOUT.metadata as usize + 50;
    flash.bus_mut().memory_mut()[at] ^= 0x10;

    let mut manager = UpdateManager::new(&mut flash, config()).expect("layout");
    assert_eq!(manager.load_metadata(), Err(UpdateError::InvalidMetadata));
    manager.init().expect("init");

    assert_eq!(manager.metadata().boot_count, 0);
    let defaults = FirmwareMetadata::new_default(&DEFAULT_LAYOUT)
        .sealed()
        .expect("seal");
    assert_eq!(manager.load_metadata(), Ok(defaults));
}

#[test]
fn records_for_other_slot_addresses_are_not_trusted() {
    let mut flash = flash();
    let mut manager = manager(&mut flash);
    let mut moved = *manager.metadata();
    moved.slot_b.base_address = 0x0018_0000;
    manager.save_metadata(&moved).expect("save");

    assert_eq!(manager.load_metadata(), Err(UpdateError::InvalidMetadata));
    manager.init().expect("init");
    assert_eq!(manager.metadata().slot_b.base_address, DEFAULT_LAYOUT.slot_b.base);
}

#[test]
fn upgrade_slot_equal_to_current_is_repaired_on_load() {
    let mut flash = flash();
    let mut manager = manager(&mut flash);
    let mut record = *manager.metadata();
    record.upgrade_slot = Slot::A;
    manager.save_metadata(&record).expect("save");

    manager.init().expect("init");

    assert_eq!(manager.current_slot(), Slot::A);
    assert_eq!(manager.upgrade_slot(), Slot::B);
}

#[test]
fn slot_queries_do_not_touch_the_bus() {
    let mut flash = flash();
    let mut manager = manager(&mut flash);

    assert_eq!(manager.slot_application_address(Slot::A), 0x1002_0000);
    assert_eq!(manager.slot_application_address(Slot::B), 0x1010_0000);
    assert_eq!(
        manager.slot_region_address(Slot::B, SlotRegion::WebAssets),
        0x001C_0000
    );
    assert_eq!(
        manager.slot_region_address(Slot::A, SlotRegion::Calibration),
        0x000F_8000
    );
    let info = manager.slot_info(Slot::B);
    assert_eq!(info.record, manager.metadata().slot_b);
    assert_eq!(info.layout, DEFAULT_LAYOUT.slot_b);
    assert_eq!(info.application_address, 0x1010_0000);
    assert!(manager.flash().bus().ops().is_empty());
}

#[test]
fn unmarked_slot_fails_validation() {
    let mut flash = flash();
    let mut manager = manager(&mut flash);

    assert_eq!(
        manager.validate_slot(Slot::B),
        Err(UpdateError::SlotNotMarkedValid)
    );
}

#[test]
fn vector_table_checks() {
    let mut flash = flash();
    let mut manager = manager(&mut flash);
    let entry = manager.slot_application_address(Slot::A);

    // Blank flash reads as 0xFFFF_FFFF.
    assert_eq!(
        manager.validate_slot(Slot::A),
        Err(UpdateError::InvalidVectorTable)
    );

    let cases = [
        (0x3000_0000, entry + 0x101, Err(UpdateError::InvalidVectorTable)),
        (0x1FFF_FFFC, entry + 0x101, Err(UpdateError::InvalidVectorTable)),
        (DEFAULT_RAM_END, entry + 0x100, Err(UpdateError::InvalidVectorTable)),
        (DEFAULT_RAM_END, 0x0800_0101, Err(UpdateError::InvalidVectorTable)),
        (DEFAULT_RAM_END, 0x1020_0001, Err(UpdateError::InvalidVectorTable)),
        // Bootloader, web assets of this slot, and the other slot.
        (DEFAULT_RAM_END, 0x1000_0101, Err(UpdateError::InvalidVectorTable)),
        (DEFAULT_RAM_END, 0x100E_0001, Err(UpdateError::InvalidVectorTable)),
        (DEFAULT_RAM_END, 0x1010_0101, Err(UpdateError::InvalidVectorTable)),
        (DEFAULT_RAM_END, 0x100D_FFFF, Ok(())),
        (DEFAULT_RAM_END, entry + 0x101, Ok(())),
        (0x2000_8000, entry + 0x4001, Ok(())),
    ];
    for (sp, reset, expected) in cases {
        plant_vectors(manager.flash(), Slot::A, sp, reset);
        assert_eq!(
            manager.validate_slot(Slot::A),
            expected,
            "sp {sp:#x} reset {reset:#x}"
        );
    }
}

#[test]
fn switching_to_an_empty_slot_keeps_the_current_one() {
    let mut flash = flash();
    let mut manager = manager(&mut flash);

    assert_eq!(manager.switch_slot(), Err(UpdateError::SlotNotMarkedValid));

    assert_eq!(manager.current_slot(), Slot::A);
    assert!(manager.flash().bus().erases().is_empty());
}

#[test]
fn staged_image_can_be_committed_and_switched_to() {
    let mut flash = flash();
    {
        let mut manager = manager(&mut flash);
        let payload = image(manager.slot_application_address(Slot::B), 1000);
        manager.erase_slot(Slot::B).expect("erase");
        manager
            .write_slot(Slot::B, SlotRegion::Application, 0, &payload[..600])
            .expect("write");
        manager
            .write_slot(Slot::B, SlotRegion::Application, 600, &payload[600..])
            .expect("write");
        manager
            .commit_slot(Slot::B, 2, 1000, crc32(&payload), 1_234)
            .expect("commit");

        let record = manager.metadata().slot_b;
        assert!(record.valid);
        assert!(record.crc_valid);
        assert_eq!(record.version, 2);
        assert_eq!(record.size, 1000);
        assert_eq!(manager.metadata().upgrade_timestamp, 1_234);

        manager.switch_slot().expect("switch");
        assert_eq!(manager.current_slot(), Slot::B);
        assert_eq!(manager.upgrade_slot(), Slot::A);
    }

    let mut manager = UpdateManager::new(&mut flash, config()).expect("layout");
    manager.init().expect("init");
    assert_eq!(manager.current_slot(), Slot::B);
}

#[test]
fn commit_rejects_an_image_with_the_wrong_checksum() {
    let mut flash = flash();
    let mut manager = manager(&mut flash);
    let payload = image(manager.slot_application_address(Slot::B), 512);
    manager.write_slot(Slot::B, SlotRegion::Application, 0, &payload).expect("write");
    let before = *manager.metadata();

    assert_eq!(
        manager.commit_slot(Slot::B, 2, 512, crc32(&payload) ^ 1, 99),
        Err(UpdateError::CrcMismatch)
    );

    assert_eq!(*manager.metadata(), before);
    assert!(manager.flash().bus().erases().is_empty());
}

#[test]
fn commit_rejects_sizes_outside_the_application_region() {
    let mut flash = flash();
    let mut manager = manager(&mut flash);
    let too_big = DEFAULT_LAYOUT.slot_b.application.size + 1;

    assert_eq!(
        manager.commit_slot(Slot::B, 2, 0, 0, 0),
        Err(UpdateError::OutOfBounds)
    );
    assert_eq!(
        manager.commit_slot(Slot::B, 2, too_big, 0, 0),
        Err(UpdateError::OutOfBounds)
    );
}

#[test]
fn staging_refuses_the_running_slot() {
    let mut flash = flash();
    let mut manager = manager(&mut flash);

    assert_eq!(manager.erase_slot(Slot::A), Err(UpdateError::SlotActive));
    assert_eq!(
        manager.write_slot(Slot::A, SlotRegion::Application, 0, &[0; 4]),
        Err(UpdateError::SlotActive)
    );
    assert_eq!(
        manager.commit_slot(Slot::A, 2, 4, 0, 0),
        Err(UpdateError::SlotActive)
    );
    assert!(manager.flash().bus().ops().is_empty());
}

#[test]
fn slot_writes_are_bounded_by_the_application_region() {
    let mut flash = flash();
    let mut manager = manager(&mut flash);
    let size = DEFAULT_LAYOUT.slot_b.application.size;

    assert_eq!(
        manager.write_slot(Slot::B, SlotRegion::Application, size - 2, &[0; 4]),
        Err(UpdateError::OutOfBounds)
    );
    assert_eq!(
        manager.write_slot(Slot::B, SlotRegion::Application, u32::MAX, &[0; 4]),
        Err(UpdateError::OutOfBounds)
    );
    manager
        .write_slot(Slot::B, SlotRegion::Application, size - 4, &[0; 4])
        .expect("last word");
    assert_eq!(
        manager.flash().bus().programs(),
        vec![(DEFAULT_LAYOUT.slot_b.application.offset + size - 4, 4)]
    );
}

#[test]
fn web_assets_and_calibration_are_staged_in_their_regions() {
    let mut flash = flash();
    let mut manager = manager(&mut flash);
    manager.erase_slot(Slot::B).expect("erase");

    manager
        .write_slot(Slot::B, SlotRegion::WebAssets, 0, b"index.html")
        .expect("assets");
    manager
        .write_slot(Slot::B, SlotRegion::Calibration, 16, b"gain=3")
        .expect("calibration");

    let assets = DEFAULT_LAYOUT.slot_b.web_assets.offset as usize;
    let calibration = DEFAULT_LAYOUT.slot_b.calibration.offset as usize + 16;
    let memory = manager.flash().bus().memory();
    assert_eq!(&memory[assets..assets + 10], b"index.html");
    assert_eq!(&memory[calibration..calibration + 6], b"gain=3");
}

#[test]
fn region_writes_stop_at_the_region_end() {
    let mut flash = flash();
    let mut manager = manager(&mut flash);
    let assets = DEFAULT_LAYOUT.slot_b.web_assets.size;
    let calibration = DEFAULT_LAYOUT.slot_b.calibration.size;

    assert_eq!(
        manager.write_slot(Slot::B, SlotRegion::WebAssets, assets - 4, &[0; 8]),
        Err(UpdateError::OutOfBounds)
    );
    assert_eq!(
        manager.write_slot(Slot::B, SlotRegion::Calibration, calibration, &[0; 1]),
        Err(UpdateError::OutOfBounds)
    );
    assert!(manager.flash().bus().programs().is_empty());
}

#[test]
fn writes_over_unerased_flash_fail_read_back() {
    let mut flash = flash();
    let mut manager = manager(&mut flash);
    let at = DEFAULT_LAYOUT.slot_b.calibration.offset as usize;
    manager.flash().bus_mut().memory_mut()[at + 300] = 0x00;

    assert_eq!(
        manager.write_slot(Slot::B, SlotRegion::Calibration, 0, &[0xA5; 512]),
        Err(UpdateError::VerifyFailed)
    );
}

#[test]
fn committed_slot_must_be_erased_before_rewriting() {
    let mut flash = flash();
    let mut manager = manager(&mut flash);
    stage_slot_b(&mut manager, 256);

    assert_eq!(
        manager.write_slot(Slot::B, SlotRegion::Application, 0, &[0; 4]),
        Err(UpdateError::SlotCommitted)
    );
}

#[test]
fn erase_slot_invalidates_before_erasing() {
    let mut flash = flash();
    let mut manager = manager(&mut flash);
    stage_slot_b(&mut manager, 256);
    manager.flash().bus_mut().clear_ops();

    manager.erase_slot(Slot::B).expect("erase");

    let erases = manager.flash().bus().erases();
    assert_eq!(erases[0], (SECTOR_ERASE, DEFAULT_LAYOUT.metadata));
    assert_eq!(erases[1], (BLOCK_ERASE_64K, DEFAULT_LAYOUT.slot_b.base));
    assert!(!manager.metadata().slot_b.valid);
    assert!(!manager.metadata().slot_b.crc_valid);
    assert!(!manager.load_metadata().expect("load").slot_b.valid);
    let slot = DEFAULT_LAYOUT.slot_b.span();
    let memory = manager.flash().bus().memory();
    assert!(
        memory[slot.offset as usize..(slot.offset + slot.size) as usize]
            .iter()
            .all(|byte| *byte == 0xFF)
    );
}

#[test]
fn checksum_verification_tracks_slot_contents() {
    let mut flash = flash();
    let mut manager = manager(&mut flash);
    stage_slot_b(&mut manager, 700);
    let at = DEFAULT_LAYOUT.slot_b.application.offset as usize + 300;

    manager.flash().bus_mut().memory_mut()[at] ^= 0x01;
    assert_eq!(manager.verify_slot_crc(Slot::B), Err(UpdateError::CrcMismatch));
    assert!(!manager.metadata().slot_b.crc_valid);
    assert!(!manager.load_metadata().expect("load").slot_b.crc_valid);

    manager.flash().bus_mut().memory_mut()[at] ^= 0x01;
    assert_eq!(manager.verify_slot_crc(Slot::B), Ok(()));
    assert!(manager.load_metadata().expect("load").slot_b.crc_valid);

    assert_eq!(
        manager.verify_slot_crc(Slot::A),
        Err(UpdateError::CrcMismatch)
    );
}

#[test]
fn verify_requires_a_committed_slot() {
    let mut flash = flash();
    let mut manager = manager(&mut flash);

    assert_eq!(
        manager.verify_slot_crc(Slot::B),
        Err(UpdateError::SlotNotMarkedValid)
    );
}

#[test]
fn failed_save_leaves_the_record_unchanged() {
    let mut flash = flash();
    let mut manager = manager(&mut flash);
    let before = *manager.metadata();
    let on_flash = metadata_sector(manager.flash());

    manager.flash().bus_mut().faults.fail_erase = true;
    assert_eq!(
        manager.set_current_slot(Slot::B),
        Err(UpdateError::Flash(FlashError::TransmitFailed))
    );

    assert_eq!(*manager.metadata(), before);
    assert_eq!(manager.current_slot(), Slot::A);
    assert_eq!(metadata_sector(manager.flash()), on_flash);
}

#[test]
fn interrupted_save_is_recovered_with_defaults() {
    let mut flash = flash();
    {
        let mut manager = manager(&mut flash);
        manager.record_boot(7).expect("boot");
        manager.flash().bus_mut().faults.fail_program = true;
        assert_eq!(
            manager.record_boot(8),
            Err(UpdateError::Flash(FlashError::TransmitFailed))
        );
        assert_eq!(manager.metadata().boot_count, 1);
        manager.flash().bus_mut().faults.fail_program = false;
    }

    let mut manager = UpdateManager::new(&mut flash, config()).expect("layout");
    manager.init().expect("init");
    assert_eq!(manager.metadata().boot_count, 0);
    assert_eq!(manager.current_slot(), Slot::A);
}

#[test]
fn defaults_are_adopted_even_when_they_cannot_be_written() {
    let mut flash = flash();
    flash.bus_mut().faults.fail_erase = true;
    let mut manager = UpdateManager::new(&mut flash, config()).expect("layout");

    assert_eq!(
        manager.init(),
        Err(UpdateError::Flash(FlashError::TransmitFailed))
    );

    assert_eq!(
        *manager.metadata(),
        FirmwareMetadata::new_default(&DEFAULT_LAYOUT)
    );
    assert_eq!(manager.current_slot(), Slot::A);
}

#[test]
fn metadata_access_restores_mapped_mode() {
    let mut flash = flash();
    flash.enter_mapped_mode().expect("map");
    let mut manager = UpdateManager::new(&mut flash, config()).expect("layout");

    manager.init().expect("init");
    assert!(manager.flash().is_mapped());
    assert!(manager.flash().bus().is_mapped());

    manager.flash().bus_mut().faults.fail_program = true;
    assert!(manager.set_current_slot(Slot::B).is_err());
    assert!(manager.flash().is_mapped());
    assert!(manager.flash().bus().is_mapped());
}

#[test]
fn failed_remap_after_a_save_is_reported() {
    let mut flash = flash();
    let mut manager = manager(&mut flash);
    manager.flash().enter_mapped_mode().expect("map");
    manager.flash().bus_mut().faults.fail_map = true;

    assert_eq!(
        manager.record_boot(5),
        Err(UpdateError::Flash(FlashError::TransmitFailed))
    );

    assert!(!manager.flash().is_mapped());
    assert_eq!(manager.metadata().boot_count, 1);
    assert_eq!(manager.load_metadata().expect("load").boot_count, 1);
}

#[test]
fn failed_remap_after_staging_is_reported() {
    let mut flash = flash();
    let mut manager = manager(&mut flash);
    manager.flash().enter_mapped_mode().expect("map");
    manager.flash().bus_mut().faults.fail_map = true;

    assert_eq!(
        manager.erase_slot(Slot::B),
        Err(UpdateError::Flash(FlashError::TransmitFailed))
    );

    manager.flash().bus_mut().faults.fail_map = false;
    manager.flash().enter_mapped_mode().expect("map");
    manager.flash().bus_mut().faults.fail_map = true;
    assert_eq!(
        manager.write_slot(Slot::B, SlotRegion::Application, 0, &[0; 4]),
        Err(UpdateError::Flash(FlashError::TransmitFailed))
    );
    assert!(!manager.flash().bus().is_mapped());
}

#[test]
fn disabled_manager_runs_slot_a_only() {
    let mut flash = flash();
    let config = UpdateConfig {
        enabled: false,
        ..UpdateConfig::default()
    };
    let mut manager = UpdateManager::new(&mut flash, config).expect("layout");

    manager.init().expect("init");

    assert!(!manager.is_enabled());
    assert!(manager.flash().bus().ops().is_empty());
    assert_eq!(manager.current_slot(), Slot::A);
    assert_eq!(manager.upgrade_slot(), Slot::A);
    assert_eq!(manager.switch_slot(), Err(UpdateError::Disabled));
    assert_eq!(manager.set_current_slot(Slot::B), Err(UpdateError::Disabled));
    assert_eq!(manager.erase_slot(Slot::B), Err(UpdateError::Disabled));
    assert_eq!(manager.record_boot(1), Err(UpdateError::Disabled));
    let record = *manager.metadata();
    assert_eq!(manager.save_metadata(&record), Err(UpdateError::Disabled));
    assert_eq!(manager.check_rollback(1), Ok(false));
    assert!(manager.flash().bus().ops().is_empty());
}

#[test]
fn unconfirmed_boots_roll_back_to_the_previous_slot() {
    let mut flash = flash();
    let mut manager = manager(&mut flash);
    let entry = manager.slot_application_address(Slot::A);
    plant_vectors(manager.flash(), Slot::A, DEFAULT_RAM_END, entry + 0x101);
    stage_slot_b(&mut manager, 256);
    manager.switch_slot().expect("switch");

    for now in 1..=2 {
        manager.record_boot(now).expect("boot");
        assert_eq!(manager.check_rollback(3), Ok(false));
    }
    manager.record_boot(3).expect("boot");
    assert_eq!(manager.check_rollback(3), Ok(true));

    assert_eq!(manager.current_slot(), Slot::A);
    assert_eq!(manager.upgrade_slot(), Slot::B);
    assert_eq!(manager.metadata().boot_count, 0);
    let persisted = manager.load_metadata().expect("load");
    assert_eq!(persisted.current_slot, Slot::A);
    assert_eq!(persisted.boot_count, 0);
}

#[test]
fn confirmed_boot_is_not_rolled_back() {
    let mut flash = flash();
    let mut manager = manager(&mut flash);
    stage_slot_b(&mut manager, 256);
    manager.switch_slot().expect("switch");
    for now in 1..=5 {
        manager.record_boot(now).expect("boot");
    }

    manager.confirm_boot().expect("confirm");
    assert_eq!(manager.metadata().boot_count, 0);
    assert_eq!(manager.check_rollback(3), Ok(false));

    manager.flash().bus_mut().clear_ops();
    manager.confirm_boot().expect("confirm");
    assert!(manager.flash().bus().erases().is_empty());
}

#[test]
fn rollback_can_be_turned_off() {
    let mut flash = flash();
    let mut manager = manager(&mut flash);
    manager.set_rollback_enabled(false).expect("disable");
    for now in 1..=5 {
        manager.record_boot(now).expect("boot");
    }

    assert_eq!(manager.check_rollback(3), Ok(false));
    assert!(!manager.load_metadata().expect("load").rollback_enabled);
}

#[test]
fn rollback_without_a_valid_fallback_stays_put() {
    let mut flash = flash();
    let mut manager = manager(&mut flash);
    for now in 1..=3 {
        manager.record_boot(now).expect("boot");
    }

    assert_eq!(
        manager.check_rollback(3),
        Err(UpdateError::SlotNotMarkedValid)
    );
    assert_eq!(manager.current_slot(), Slot::A);
    assert_eq!(manager.metadata().boot_count, 3);
}

#[test]
fn boot_count_saturates() {
    let mut flash = flash();
    let mut manager = manager(&mut flash);
    let mut record = *manager.metadata();
    record.boot_count = u8::MAX;
    manager.save_metadata(&record).expect("save");

    manager.record_boot(1).expect("boot");

    assert_eq!(manager.metadata().boot_count, u8::MAX);
}

#[test]
fn overlapping_layout_is_rejected() {
    let mut flash = flash();
    let config = UpdateConfig {
        layout: FlashLayout {
            metadata: DEFAULT_LAYOUT.slot_a.base,
            ..DEFAULT_LAYOUT
        },
        ..config()
    };

    assert!(matches!(
        UpdateManager::new(&mut flash, config),
        Err(UpdateError::InvalidLayout)
    ));
}
