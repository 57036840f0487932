//! Application packet catalogue: request codes, fixed headers and the
//! writers/readers the firmware uses on top of the codec.

use bytemuck::{Pod, Zeroable};

use super::codec::{CodecError, PacketSlot, RxBuffer, TxBuffer};

/* ───── Request codes ───────────────────────────────────────────────── */

/// Packets sent by the firmware.
#[repr(u16)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FirmwareRequest {
    ObjectModel = 1,
    CodeBufferUpdate = 2,
    Message = 3,
    ExecuteMacro = 4,
    AbortFile = 5,
    PrintPaused = 7,
    Locked = 9,
    FileChunk = 10,
    EvaluationResult = 11,
    DoCode = 12,
    WaitForAcknowledgement = 13,
    MacroFileClosed = 14,
    MessageAcknowledged = 15,
}

impl From<FirmwareRequest> for u16 {
    fn from(r: FirmwareRequest) -> Self {
        r as u16
    }
}

/// Packets sent by the SBC.
#[repr(u16)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SbcRequest {
    EmergencyStop = 0,
    Reset = 1,
    Code = 2,
    GetObjectModel = 3,
    SetObjectModel = 4,
    PrintStarted = 5,
    PrintStopped = 6,
    MacroCompleted = 7,
    GetHeightMap = 8,
    SetHeightMap = 9,
    LockMovementAndWaitForStandstill = 10,
    Unlock = 11,
    AssignFilament = 12,
    FileChunk = 13,
    EvaluateExpression = 14,
    Message = 15,
    InvalidateChannel = 16,
}

impl TryFrom<u16> for SbcRequest {
    type Error = u16;

    fn try_from(v: u16) -> Result<Self, Self::Error> {
        use SbcRequest::*;
        Ok(match v {
            0 => EmergencyStop,
            1 => Reset,
            2 => Code,
            3 => GetObjectModel,
            4 => SetObjectModel,
            5 => PrintStarted,
            6 => PrintStopped,
            7 => MacroCompleted,
            8 => GetHeightMap,
            9 => SetHeightMap,
            10 => LockMovementAndWaitForStandstill,
            11 => Unlock,
            12 => AssignFilament,
            13 => FileChunk,
            14 => EvaluateExpression,
            15 => Message,
            16 => InvalidateChannel,
            other => return Err(other),
        })
    }
}

/// Why a print was paused.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PrintPausedReason {
    User = 1,
    GCode = 2,
    FilamentChange = 3,
    Trigger = 4,
    HeaterFault = 5,
    FilamentError = 6,
    Stall = 7,
    LowVoltage = 8,
}

/// Set on a message type when the text continues in a later packet.
pub const MESSAGE_PUSH_FLAG: u32 = 0x8000_0000;

/// Minimum reply text worth sending when the buffer is nearly full.
const MIN_REPLY_CHUNK: usize = 16;

/* ───── Fixed headers ───────────────────────────────────────────────── */

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Zeroable, Pod)]
pub struct StringHeader {
    pub length: u16,
    pub padding: u16,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Zeroable, Pod)]
pub struct CodeBufferUpdateHeader {
    pub buffer_space: u16,
    pub padding: u16,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Zeroable, Pod)]
pub struct MessageHeader {
    pub message_type: u32,
    pub length: u16,
    pub padding: u16,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Zeroable, Pod)]
pub struct ExecuteMacroHeader {
    pub channel: u8,
    pub dummy: u8,
    pub from_code: u8,
    pub length: u8,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Zeroable, Pod)]
pub struct PrintPausedHeader {
    pub file_position: u32,
    pub pause_reason: u8,
    pub padding_a: u8,
    pub padding_b: u16,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Zeroable, Pod)]
pub struct DoCodeHeader {
    pub channel: u8,
    pub padding: u8,
    pub length: u16,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Zeroable, Pod)]
pub struct AbortFileHeader {
    pub channel: u8,
    pub abort_all: u8,
    pub padding: u16,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Zeroable, Pod)]
pub struct CodeChannelHeader {
    pub channel: u8,
    pub padding_a: u8,
    pub padding_b: u16,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Zeroable, Pod)]
pub struct FileChunkHeader {
    pub offset: u32,
    pub max_length: u32,
    pub filename_length: u32,
}

/// Value kinds of an evaluation result.
pub mod data_type {
    pub const INT: u8 = 0;
    pub const UINT: u8 = 1;
    pub const FLOAT: u8 = 2;
    pub const STRING: u8 = 6;
    pub const EXPRESSION: u8 = 7;
    pub const BOOL: u8 = 8;
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Zeroable, Pod)]
pub struct EvaluationResultHeader {
    pub data_type: u8,
    pub padding: u8,
    pub expression_length: u16,
    /// Int/uint/float bits, or the length of a trailing string.
    pub value: u32,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Zeroable, Pod)]
pub struct GetObjectModelHeader {
    pub key_length: u16,
    pub flags_length: u16,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Zeroable, Pod)]
pub struct MacroCompleteHeader {
    pub channel: u8,
    pub error: u8,
    pub padding: u16,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Zeroable, Pod)]
pub struct AssignFilamentHeader {
    pub extruder: i32,
    pub filament_length: u32,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Zeroable, Pod)]
pub struct FileChunk {
    pub data_length: i32,
    pub file_length: u32,
}

const fn size<T>() -> usize {
    core::mem::size_of::<T>()
}

/// Converts a length for a header field narrower than `usize`.
fn field_len<T: TryFrom<usize>>(length: usize, max: usize) -> Result<T, CodecError> {
    T::try_from(length).map_err(|_| CodecError::FieldOverflow { length, max })
}

/// Checks the whole packet fits before anything is written.
fn begin<const N: usize>(
    tx: &mut TxBuffer<N>,
    request: FirmwareRequest,
    payload_len: usize,
) -> Result<PacketSlot, CodecError> {
    if !tx.can_write_packet(payload_len) {
        return Err(CodecError::BufferFull {
            needed: payload_len,
            available: tx.free_space(),
        });
    }
    tx.write_packet_header(request.into(), payload_len, 0)
}

/* ───── Writers ─────────────────────────────────────────────────────── */

pub fn write_object_model<const N: usize>(tx: &mut TxBuffer<N>, json: &[u8]) -> Result<(), CodecError> {
    let length = field_len(json.len(), u16::MAX as usize)?;
    begin(tx, FirmwareRequest::ObjectModel, size::<StringHeader>() + json.len())?;
    tx.write_data_header(&StringHeader {
        length,
        padding: 0,
    })?;
    tx.write_data(json)
}

pub fn write_code_buffer_update<const N: usize>(
    tx: &mut TxBuffer<N>,
    buffer_space: u16,
) -> Result<(), CodecError> {
    begin(tx, FirmwareRequest::CodeBufferUpdate, size::<CodeBufferUpdateHeader>())?;
    tx.write_data_header(&CodeBufferUpdateHeader {
        buffer_space,
        padding: 0,
    })?;
    Ok(())
}

/// Writes as much of `text` as fits and returns the number of bytes taken.
/// If the text had to be cut, the push flag is set so the SBC waits for the
/// remainder in a later cycle.
pub fn write_code_reply<const N: usize>(
    tx: &mut TxBuffer<N>,
    message_type: u32,
    text: &[u8],
) -> Result<usize, CodecError> {
    let min_chunk = text.len().min(MIN_REPLY_CHUNK);
    let slot = begin(tx, FirmwareRequest::Message, size::<MessageHeader>() + min_chunk)?;
    let header = tx.write_data_header(&MessageHeader {
        message_type,
        length: 0,
        padding: 0,
    })?;

    let taken = text.len().min(tx.free_space()).min(u16::MAX as usize);
    tx.write_data(&text[..taken])?;

    let message_type = if taken < text.len() {
        message_type | MESSAGE_PUSH_FLAG
    } else {
        message_type
    };
    tx.patch_data_header(
        header,
        &MessageHeader {
            message_type,
            length: taken as u16,
            padding: 0,
        },
    );
    tx.set_packet_length(slot, size::<MessageHeader>() + taken);
    Ok(taken)
}

pub fn write_macro_request<const N: usize>(
    tx: &mut TxBuffer<N>,
    channel: u8,
    filename: &str,
    from_code: bool,
) -> Result<(), CodecError> {
    let name = filename.as_bytes();
    let length = field_len(name.len(), u8::MAX as usize)?;
    begin(tx, FirmwareRequest::ExecuteMacro, size::<ExecuteMacroHeader>() + name.len())?;
    tx.write_data_header(&ExecuteMacroHeader {
        channel,
        dummy: 0,
        from_code: from_code as u8,
        length,
    })?;
    tx.write_data(name)
}

pub fn write_abort_file<const N: usize>(
    tx: &mut TxBuffer<N>,
    channel: u8,
    abort_all: bool,
) -> Result<(), CodecError> {
    begin(tx, FirmwareRequest::AbortFile, size::<AbortFileHeader>())?;
    tx.write_data_header(&AbortFileHeader {
        channel,
        abort_all: abort_all as u8,
        padding: 0,
    })?;
    Ok(())
}

pub fn write_print_paused<const N: usize>(
    tx: &mut TxBuffer<N>,
    file_position: u32,
    reason: PrintPausedReason,
) -> Result<(), CodecError> {
    begin(tx, FirmwareRequest::PrintPaused, size::<PrintPausedHeader>())?;
    tx.write_data_header(&PrintPausedHeader {
        file_position,
        pause_reason: reason as u8,
        padding_a: 0,
        padding_b: 0,
    })?;
    Ok(())
}

/// Asks the SBC to run `code` on `channel` on the firmware's behalf.
pub fn write_do_code<const N: usize>(
    tx: &mut TxBuffer<N>,
    channel: u8,
    code: &[u8],
) -> Result<(), CodecError> {
    let length = field_len(code.len(), u16::MAX as usize)?;
    begin(tx, FirmwareRequest::DoCode, size::<DoCodeHeader>() + code.len())?;
    tx.write_data_header(&DoCodeHeader {
        channel,
        padding: 0,
        length,
    })?;
    tx.write_data(code)
}

/// Locked, MacroFileClosed, WaitForAcknowledgement and MessageAcknowledged
/// all carry nothing but the code channel.
pub fn write_code_channel_event<const N: usize>(
    tx: &mut TxBuffer<N>,
    request: FirmwareRequest,
    channel: u8,
) -> Result<(), CodecError> {
    begin(tx, request, size::<CodeChannelHeader>())?;
    tx.write_data_header(&CodeChannelHeader {
        channel,
        padding_a: 0,
        padding_b: 0,
    })?;
    Ok(())
}

pub fn write_file_chunk_request<const N: usize>(
    tx: &mut TxBuffer<N>,
    filename: &str,
    offset: u32,
    max_length: u32,
) -> Result<(), CodecError> {
    let name = filename.as_bytes();
    let filename_length = field_len(name.len(), u32::MAX as usize)?;
    begin(tx, FirmwareRequest::FileChunk, size::<FileChunkHeader>() + name.len())?;
    tx.write_data_header(&FileChunkHeader {
        offset,
        max_length,
        filename_length,
    })?;
    tx.write_data(name)
}

pub fn write_evaluation_error<const N: usize>(
    tx: &mut TxBuffer<N>,
    expression: &str,
    error: &str,
) -> Result<(), CodecError> {
    let (expr, err) = (expression.as_bytes(), error.as_bytes());
    let expression_length = field_len(expr.len(), u16::MAX as usize)?;
    let value = field_len(err.len(), u32::MAX as usize)?;
    begin(
        tx,
        FirmwareRequest::EvaluationResult,
        size::<EvaluationResultHeader>() + expr.len() + err.len(),
    )?;
    tx.write_data_header(&EvaluationResultHeader {
        data_type: data_type::EXPRESSION,
        padding: 0,
        expression_length,
        value,
    })?;
    tx.write_data(expr)?;
    tx.write_data(err)
}

/* ───── Readers ─────────────────────────────────────────────────────── */

/// Packets whose whole payload is a code channel.
pub fn read_code_channel<const N: usize>(rx: &mut RxBuffer<N>) -> Result<u8, CodecError> {
    Ok(rx.read_data_header::<CodeChannelHeader>()?.channel)
}

/// Returns `(key, flags)` of an object model query.
pub fn read_get_object_model<const N: usize>(
    rx: &mut RxBuffer<N>,
) -> Result<(&[u8], &[u8]), CodecError> {
    let header: GetObjectModelHeader = rx.read_data_header()?;
    let (key_len, flags_len) = (header.key_length as usize, header.flags_length as usize);
    let data = rx.read_data(rx.remaining())?;
    if key_len + flags_len > data.len() {
        return Err(CodecError::Truncated {
            needed: key_len + flags_len,
            available: data.len(),
        });
    }
    Ok((&data[..key_len], &data[key_len..key_len + flags_len]))
}

/// Returns `(message_type, text)`.
pub fn read_message<const N: usize>(rx: &mut RxBuffer<N>) -> Result<(u32, &[u8]), CodecError> {
    let header: MessageHeader = rx.read_data_header()?;
    let text = rx.read_data(header.length as usize)?;
    Ok((header.message_type, text))
}

/// Returns the chunk header and its data.
pub fn read_file_chunk<const N: usize>(rx: &mut RxBuffer<N>) -> Result<(FileChunk, &[u8]), CodecError> {
    let header: FileChunk = rx.read_data_header()?;
    let len = header.data_length.max(0) as usize;
    Ok((header, rx.read_data(len)?))
}

/// Returns `(channel, expression)`.
pub fn read_evaluate_expression<const N: usize>(
    rx: &mut RxBuffer<N>,
) -> Result<(u8, &[u8]), CodecError> {
    let channel = read_code_channel(rx)?;
    let expression = rx.read_data(rx.remaining())?;
    Ok((channel, expression))
}

/// Returns `(channel, error)`.
pub fn read_macro_complete<const N: usize>(rx: &mut RxBuffer<N>) -> Result<(u8, bool), CodecError> {
    let header: MacroCompleteHeader = rx.read_data_header()?;
    Ok((header.channel, header.error != 0))
}

/// Returns `(extruder, filament_name)`.
pub fn read_assign_filament<const N: usize>(
    rx: &mut RxBuffer<N>,
) -> Result<(i32, &[u8]), CodecError> {
    let header: AssignFilamentHeader = rx.read_data_header()?;
    let name = rx.read_data(header.filament_length as usize)?;
    Ok((header.extruder, name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::wire::PACKET_HEADER_SIZE;

    fn load<const N: usize>(tx: &TxBuffer<N>) -> RxBuffer<N> {
        let mut rx = RxBuffer::<N>::new();
        let bytes = tx.as_bytes();
        rx.receive_region(bytes.len()).copy_from_slice(bytes);
        rx.begin_reading(bytes.len());
        rx
    }

    #[test]
    fn test_code_reply_fits() {
        let mut tx = TxBuffer::<128>::new();
        assert_eq!(write_code_reply(&mut tx, 1, b"ok\n").unwrap(), 3);

        let mut rx = load(&tx);
        let packet = rx.read_packet().unwrap().unwrap();
        assert_eq!(packet.request, FirmwareRequest::Message as u16);
        assert_eq!(packet.length as usize, size::<MessageHeader>() + 3);
        let (kind, text) = read_message(&mut rx).unwrap();
        assert_eq!(kind, 1);
        assert_eq!(text, b"ok\n");
    }

    #[test]
    fn test_code_reply_truncates_with_push_flag() {
        let mut tx = TxBuffer::<48>::new();
        let text = [b'x'; 64];
        let taken = write_code_reply(&mut tx, 2, &text).unwrap();
        assert_eq!(taken, 48 - PACKET_HEADER_SIZE - size::<MessageHeader>());
        assert_eq!(tx.len(), 48);

        let mut rx = load(&tx);
        rx.read_packet().unwrap().unwrap();
        let (kind, chunk) = read_message(&mut rx).unwrap();
        assert_eq!(kind, 2 | MESSAGE_PUSH_FLAG);
        assert_eq!(chunk.len(), taken);
    }

    #[test]
    fn test_writer_leaves_buffer_untouched_when_full() {
        let mut tx = TxBuffer::<24>::new();
        write_abort_file(&mut tx, 1, true).unwrap();
        let used = tx.len();
        assert!(write_macro_request(&mut tx, 0, "homeall.g", false).is_err());
        assert_eq!(tx.len(), used);
        assert_eq!(tx.packet_count(), 1);
    }

    #[test]
    fn test_macro_request_then_channel_event() {
        let mut tx = TxBuffer::<128>::new();
        write_macro_request(&mut tx, 3, "stop.g", true).unwrap();
        write_code_channel_event(&mut tx, FirmwareRequest::Locked, 3).unwrap();

        let mut rx = load(&tx);
        let first = rx.read_packet().unwrap().unwrap();
        assert_eq!(first.request, FirmwareRequest::ExecuteMacro as u16);
        let header: ExecuteMacroHeader = rx.read_data_header().unwrap();
        assert_eq!(header.from_code, 1);
        assert_eq!(rx.read_data(header.length as usize).unwrap(), b"stop.g");

        let second = rx.read_packet().unwrap().unwrap();
        assert_eq!(second.request, FirmwareRequest::Locked as u16);
        assert_eq!(second.id, 1);
        assert_eq!(read_code_channel(&mut rx).unwrap(), 3);
    }

    #[test]
    fn test_evaluation_error_concatenates_strings() {
        let mut tx = TxBuffer::<128>::new();
        write_evaluation_error(&mut tx, "move.axes", "unknown value").unwrap();

        let mut rx = load(&tx);
        rx.read_packet().unwrap().unwrap();
        let header: EvaluationResultHeader = rx.read_data_header().unwrap();
        assert_eq!(header.data_type, data_type::EXPRESSION);
        let text = rx.read_data(rx.remaining()).unwrap();
        let (expr, err) = text.split_at(header.expression_length as usize);
        assert_eq!(expr, b"move.axes");
        assert_eq!(err, b"unknown value");
        assert_eq!(err.len(), header.value as usize);
    }

    #[test]
    fn test_read_object_model_query() {
        // Built the way the SBC lays it out.
        let mut tx = TxBuffer::<64>::new();
        tx.write_packet_header(SbcRequest::GetObjectModel as u16, 4 + 9, 0)
            .unwrap();
        tx.write_data_header(&GetObjectModelHeader {
            key_length: 5,
            flags_length: 4,
        })
        .unwrap();
        tx.write_data(b"heatf99f").unwrap();
        tx.write_data(b"n").unwrap();

        let mut rx = load(&tx);
        let packet = rx.read_packet().unwrap().unwrap();
        assert_eq!(SbcRequest::try_from(packet.request), Ok(SbcRequest::GetObjectModel));
        let (key, flags) = read_get_object_model(&mut rx).unwrap();
        assert_eq!(key, b"heatf");
        assert_eq!(flags, b"99fn");
    }

    #[test]
    fn test_read_file_chunk_and_filament() {
        let mut tx = TxBuffer::<96>::new();
        tx.write_packet_header(SbcRequest::FileChunk as u16, 8 + 3, 0)
            .unwrap();
        tx.write_data_header(&FileChunk {
            data_length: 3,
            file_length: 1000,
        })
        .unwrap();
        tx.write_data(b"G1 ").unwrap();
        tx.write_packet_header(SbcRequest::AssignFilament as u16, 8 + 3, 0)
            .unwrap();
        tx.write_data_header(&AssignFilamentHeader {
            extruder: 1,
            filament_length: 3,
        })
        .unwrap();
        tx.write_data(b"PLA").unwrap();

        let mut rx = load(&tx);
        rx.read_packet().unwrap().unwrap();
        let (chunk, data) = read_file_chunk(&mut rx).unwrap();
        assert_eq!(chunk.file_length, 1000);
        assert_eq!(data, b"G1 ");

        rx.read_packet().unwrap().unwrap();
        assert_eq!(read_assign_filament(&mut rx).unwrap(), (1, &b"PLA"[..]));
    }

    #[test]
    fn test_print_paused_and_do_code() {
        let mut tx = TxBuffer::<64>::new();
        write_print_paused(&mut tx, 123_456, PrintPausedReason::FilamentChange).unwrap();
        write_do_code(&mut tx, 2, b"M291 P\"hi\"").unwrap();

        let mut rx = load(&tx);
        let first = rx.read_packet().unwrap().unwrap();
        assert_eq!(first.request, FirmwareRequest::PrintPaused as u16);
        assert_eq!(first.length as usize, size::<PrintPausedHeader>());
        let paused: PrintPausedHeader = rx.read_data_header().unwrap();
        assert_eq!(paused.file_position, 123_456);
        assert_eq!(paused.pause_reason, PrintPausedReason::FilamentChange as u8);

        let second = rx.read_packet().unwrap().unwrap();
        assert_eq!(second.request, FirmwareRequest::DoCode as u16);
        let header: DoCodeHeader = rx.read_data_header().unwrap();
        assert_eq!(header.channel, 2);
        assert_eq!(rx.read_data(header.length as usize).unwrap(), b"M291 P\"hi\"");
    }

    #[test]
    fn test_overlong_filename_is_refused() {
        let mut tx = TxBuffer::<1024>::new();
        let name = "m".repeat(256);
        assert_eq!(
            write_macro_request(&mut tx, 0, &name, false),
            Err(CodecError::FieldOverflow {
                length: 256,
                max: 255
            })
        );
        assert!(tx.is_empty());
        assert_eq!(tx.packet_count(), 0);

        // 255 bytes still fits the length field
        write_macro_request(&mut tx, 0, &name[..255], false).unwrap();
        let mut rx = load(&tx);
        rx.read_packet().unwrap().unwrap();
        let header: ExecuteMacroHeader = rx.read_data_header().unwrap();
        assert_eq!(header.length, 255);
    }

    #[test]
    fn test_unknown_sbc_request() {
        assert_eq!(SbcRequest::try_from(999), Err(999));
    }
}
