// Licensed under the Apache-2.0 license

//! SMBus transactions emulated over plain bus messages.
//!
//! | size      | write                  | read                         |
//! |-----------|------------------------|------------------------------|
//! | Quick     | address only           | address, one byte discarded  |
//! | Byte      | `[command]`            | 1 byte                       |
//! | ByteData  | `[command, byte]`      | `[command]`, 1 byte          |
//! | WordData  | `[command, lo, hi]`    | `[command]`, 2 bytes         |
//! | BlockData | `[command, n, data..]` | `[command]`, count then data |

use crate::i2c::common::Direction;
use crate::i2c::error::Error;
use crate::i2c::msg::{I2cMsg, TransferResult, SMBUS_BLOCK_MAX};
use embedded_hal::i2c::SevenBitAddress;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SmbusSize {
    Quick,
    Byte,
    ByteData,
    WordData,
    BlockData,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SmbusData {
    None,
    Byte(u8),
    /// Sent and received little endian.
    Word(u16),
    Block(heapless::Vec<u8, SMBUS_BLOCK_MAX>),
}

/// Run one SMBus transaction through `transfer`.
///
/// Write data is checked against `size` before `transfer` is called. For
/// reads the incoming `data` is ignored and replaced with what was received.
///
/// # Errors
///
/// [`Error::InvalidRequest`] for a write whose data does not fit `size` or an
/// empty block, otherwise the error of the failing message.
pub fn emulate<F>(
    addr: SevenBitAddress,
    direction: Direction,
    command: u8,
    size: SmbusSize,
    data: &mut SmbusData,
    transfer: F,
) -> Result<(), Error>
where
    F: FnOnce(&mut [I2cMsg<'_>]) -> TransferResult,
{
    let run = |msgs: &mut [I2cMsg<'_>]| -> Result<(), Error> {
        transfer(msgs).map(|_| ()).map_err(|failure| failure.error)
    };
    let command_msg = [command];

    match direction {
        Direction::Write => {
            let mut out: heapless::Vec<u8, { SMBUS_BLOCK_MAX + 2 }> = heapless::Vec::new();
            match (size, &*data) {
                (SmbusSize::Quick, SmbusData::None) => {}
                (SmbusSize::Byte, SmbusData::None) => out.push(command).map_err(overflow)?,
                (SmbusSize::ByteData, SmbusData::Byte(value)) => {
                    out.extend_from_slice(&[command, *value]).map_err(overflow)?;
                }
                (SmbusSize::WordData, SmbusData::Word(value)) => {
                    let [lo, hi] = value.to_le_bytes();
                    out.extend_from_slice(&[command, lo, hi]).map_err(overflow)?;
                }
                (SmbusSize::BlockData, SmbusData::Block(bytes)) if !bytes.is_empty() => {
                    let count = u8::try_from(bytes.len()).map_err(|_| Error::InvalidRequest)?;
                    out.extend_from_slice(&[command, count]).map_err(overflow)?;
                    out.extend_from_slice(bytes).map_err(overflow)?;
                }
                _ => return Err(Error::InvalidRequest),
            }
            run(&mut [I2cMsg::write(addr, &out)])
        }
        Direction::Read => {
            *data = match size {
                SmbusSize::Quick => {
                    run(&mut [I2cMsg::read(addr, &mut [])])?;
                    SmbusData::None
                }
                SmbusSize::Byte => {
                    let mut value = [0u8; 1];
                    run(&mut [I2cMsg::read(addr, &mut value)])?;
                    let [byte] = value;
                    SmbusData::Byte(byte)
                }
                SmbusSize::ByteData => {
                    let mut value = [0u8; 1];
                    run(&mut [
                        I2cMsg::write(addr, &command_msg),
                        I2cMsg::read(addr, &mut value),
                    ])?;
                    let [byte] = value;
                    SmbusData::Byte(byte)
                }
                SmbusSize::WordData => {
                    let mut value = [0u8; 2];
                    run(&mut [
                        I2cMsg::write(addr, &command_msg),
                        I2cMsg::read(addr, &mut value),
                    ])?;
                    SmbusData::Word(u16::from_le_bytes(value))
                }
                SmbusSize::BlockData => {
                    let mut block = [0u8; SMBUS_BLOCK_MAX + 1];
                    run(&mut [
                        I2cMsg::write(addr, &command_msg),
                        I2cMsg::read_block(addr, &mut block),
                    ])?;
                    let (count, rest) = block
                        .split_first()
                        .ok_or(Error::InvalidRequest)?;
                    let bytes = rest
                        .get(..usize::from(*count))
                        .ok_or(Error::InvalidBlockLength(*count))?;
                    SmbusData::Block(
                        heapless::Vec::from_slice(bytes)
                            .map_err(|()| Error::InvalidBlockLength(*count))?,
                    )
                }
            };
            Ok(())
        }
    }
}

fn overflow<E>(_: E) -> Error {
    Error::InvalidRequest
}
