//! Read-only access to the configuration document in the `config` data partition.

use embedded_storage::{ReadStorage, Storage};
use esp_bootloader_esp_idf::partitions::{
    DataPartitionSubType, PARTITION_TABLE_MAX_LEN, PartitionType, read_partition_table,
};
use esp_rom_sys::rom::spiflash::{
    ESP_ROM_SPIFLASH_RESULT_OK, esp_rom_spiflash_read, esp_rom_spiflash_unlock,
};
use firerelay_core::config::{ConfigSource, StoredDocumentError, stored_document_len};
use log::{debug, error};

const DEFAULT_FLASH_CAPACITY_BYTES: usize = 16 * 1024 * 1024;

/// Label of the config partition in `partitions.csv`.
pub const CONFIG_PARTITION_LABEL: &str = "config";

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum FlashConfigError {
    PartitionTable,
    ConfigPartitionMissing,
    FlashOpFailed(i32),
    ShortRead,
    DocumentTooLarge,
    /// The partition holds a filesystem image or other non-JSON data.
    NotRawJson,
    Unsupported,
}

#[derive(Debug)]
struct RawFlash;

impl RawFlash {
    fn new() -> Result<Self, FlashConfigError> {
        let rc = unsafe { esp_rom_spiflash_unlock() };
        if rc != ESP_ROM_SPIFLASH_RESULT_OK {
            return Err(FlashConfigError::FlashOpFailed(rc));
        }
        Ok(Self)
    }

    fn read_word(&mut self, addr: u32) -> Result<u32, FlashConfigError> {
        if !addr.is_multiple_of(4) {
            return Err(FlashConfigError::Unsupported);
        }

        let mut word = 0u32;
        let rc = unsafe { esp_rom_spiflash_read(addr, &mut word as *mut u32 as *const u32, 4) };
        if rc != ESP_ROM_SPIFLASH_RESULT_OK {
            return Err(FlashConfigError::FlashOpFailed(rc));
        }
        Ok(word)
    }

    /// Reads an unaligned byte range through aligned word reads.
    fn read_bytes(&mut self, addr: u32, out: &mut [u8]) -> Result<(), FlashConfigError> {
        if out.is_empty() {
            return Ok(());
        }

        let start = addr & !0b11;
        let end = (addr + out.len() as u32 + 3) & !0b11;
        let mut copied = 0usize;

        for word_addr in (start..end).step_by(4) {
            let bytes = self.read_word(word_addr)?.to_le_bytes();
            for (i, byte) in bytes.iter().enumerate() {
                let Some(dst) = (word_addr + i as u32).checked_sub(addr) else {
                    continue;
                };
                let Some(slot) = out.get_mut(dst as usize) else {
                    break;
                };
                *slot = *byte;
                copied += 1;
            }
        }

        if copied == out.len() {
            Ok(())
        } else {
            Err(FlashConfigError::ShortRead)
        }
    }
}

impl ReadStorage for RawFlash {
    type Error = FlashConfigError;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
        self.read_bytes(offset, bytes)
    }

    fn capacity(&self) -> usize {
        DEFAULT_FLASH_CAPACITY_BYTES
    }
}

impl Storage for RawFlash {
    fn write(&mut self, _offset: u32, _bytes: &[u8]) -> Result<(), Self::Error> {
        Err(FlashConfigError::Unsupported)
    }
}

/// Configuration document stored as raw JSON at the start of the `config`
/// data partition (subtype `spiffs`), written with `espflash write-bin`.
#[derive(Debug)]
pub struct FlashConfigStore {
    flash: RawFlash,
    offset: u32,
    len: u32,
}

impl FlashConfigStore {
    pub fn new() -> Result<Self, FlashConfigError> {
        let mut flash = RawFlash::new()?;

        let mut table_buf = [0u8; PARTITION_TABLE_MAX_LEN];
        let table = read_partition_table(&mut flash, &mut table_buf)
            .map_err(|_| FlashConfigError::PartitionTable)?;

        let mut labelled: Option<(u32, u32)> = None;
        let mut fallback_spiffs: Option<(u32, u32)> = None;

        for entry in table.iter() {
            if !matches!(
                entry.partition_type(),
                PartitionType::Data(DataPartitionSubType::Spiffs)
            ) {
                continue;
            }
            if entry.label_as_str() == CONFIG_PARTITION_LABEL {
                labelled = Some((entry.offset(), entry.len()));
                break;
            }
            if fallback_spiffs.is_none() {
                fallback_spiffs = Some((entry.offset(), entry.len()));
            }
        }

        let (offset, len) = labelled.or(fallback_spiffs).ok_or_else(|| {
            error!("no spiffs data partition; flash with --partition-table partitions.csv");
            FlashConfigError::ConfigPartitionMissing
        })?;

        debug!("config partition at 0x{:x} ({} bytes)", offset, len);
        Ok(Self { flash, offset, len })
    }
}

impl ConfigSource for FlashConfigStore {
    type Error = FlashConfigError;

    fn read_document(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let window = buf.len().min(self.len as usize);
        let window = &mut buf[..window];
        self.flash.read_bytes(self.offset, window)?;

        stored_document_len(window, self.len as usize).map_err(|err| match err {
            StoredDocumentError::TooLarge => FlashConfigError::DocumentTooLarge,
            StoredDocumentError::NotRawJson => {
                error!("config partition does not hold raw JSON; write config.json with write-bin");
                FlashConfigError::NotRawJson
            }
        })
    }
}
