/*
 * Copyright (C) 2025 Pedro Henrique / phdev13
 *
 * File: src/hw_frontend/protocol.rs
 *
 * The wire protocol spoken with the controller board: a fixed-size packed
 * little-endian frame with start/stop signatures and an additive 16-bit
 * checksum. Encoding and parsing are done with explicit byte slicing, no
 * struct casts, so a corrupt frame can never produce undefined behavior,
 * only a `FrameError`.
 *
 * Frame layout (74 bytes):
 *
 *   start_header[3] = {0x01, 0x02, 0x03}
 *   cmd             : u8
 *   sub_cmd         : u8
 *   continuation    : u8     0 = final, 1 = first half of a two-part payload
 *   reserved        : u8
 *   timestamp       : u32
 *   payload[58]
 *   crc             : u16    sum of cmd, sub_cmd, continuation, timestamp
 *                            bytes and payload bytes, mod 2^16
 *   stop_header[3]  = {0x04, 0x05, 0x06}
 *
 * Acknowledgement frames share the layout; their payload carries the status
 * code plus the command/sub-command pair of the packet being acked, and
 * their timestamp echoes the acked packet's, which together reconstitute
 * the transmission UUID used for pairing.
 *
 * Dependencies:
 *   - thiserror: frame validation errors.
 *
 * SPDX-License-Identifier: AGPL-3.0 license
 */

use thiserror::Error;

pub const START_SIGNATURE: [u8; 3] = [0x01, 0x02, 0x03];
pub const STOP_SIGNATURE: [u8; 3] = [0x04, 0x05, 0x06];

pub const PAYLOAD_LENGTH: usize = 58;
pub const PACKET_LENGTH: usize = 74;

const CMD_OFFSET: usize = 3;
const SUB_CMD_OFFSET: usize = 4;
const CONTINUATION_OFFSET: usize = 5;
const TIMESTAMP_OFFSET: usize = 7;
const PAYLOAD_OFFSET: usize = 11;
const CRC_OFFSET: usize = PAYLOAD_OFFSET + PAYLOAD_LENGTH;
const STOP_OFFSET: usize = CRC_OFFSET + 2;

/// Commands understood by both sides of the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SenseiCmd {
    EnableSendingPackets = 4,
    SetSamplingRate = 6,
    GetAllValues = 7,
    ConfigurePin = 100,
    SetDigitalOutput = 101,
    Value = 200,
    ValueImu = 201,
    Ack = 250,
}

impl SenseiCmd {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            4 => Some(Self::EnableSendingPackets),
            6 => Some(Self::SetSamplingRate),
            7 => Some(Self::GetAllValues),
            100 => Some(Self::ConfigurePin),
            101 => Some(Self::SetDigitalOutput),
            200 => Some(Self::Value),
            201 => Some(Self::ValueImu),
            250 => Some(Self::Ack),
            _ => None,
        }
    }
}

/// `ConfigurePin` sub-commands: which parameter class the frame carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConfigParameter {
    PinType = 1,
    PinEnabled = 2,
    SendingMode = 3,
    DeltaTicks = 4,
    AdcBitResolution = 5,
    LowpassFilterOrder = 6,
    LowpassCutoff = 7,
    SliderThreshold = 8,
}

/// Status codes reported by the board, surfaced verbatim as error kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum StatusCode {
    Ok = 0,
    StartHeaderNotPresent = 1,
    StopHeaderNotPresent = 2,
    CrcNotCorrect = 3,
    CmdNotValid = 4,
    SubCmdNotValid = 5,
    CmdNotProcessed = 6,
    DigitalOutputIdxBankNotValid = 7,
    DigitalOutputIdxPinNotValid = 8,
    IdxPinNotValid = 9,
    PinTypeNotValid = 10,
    TimeoutOnResponse = 11,
    IncorrectPayloadSize = 12,
    NoAffinityWithResponsePacket = 13,
    CmdNotExpected = 14,
    IncorrectParametersNumber = 15,
    IncorrectParameterType = 16,
    IncompleteParameters = 17,
    WrongNumberExpectedResponsePackets = 18,
    ImuGenericError = 19,
    ImuCommunicationError = 20,
    ImuNotConnected = 21,
    ImuCmdNotExecuted = 22,
    ImuDisabled = 23,
    SerialDeviceGenericError = 24,
    SerialDevicePortNotOpen = 25,
    NoExternalProcessingNecessary = 254,
    GenericError = 255,
}

impl StatusCode {
    /// Unknown codes from newer firmware collapse to `GenericError` rather
    /// than being dropped.
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Ok,
            1 => Self::StartHeaderNotPresent,
            2 => Self::StopHeaderNotPresent,
            3 => Self::CrcNotCorrect,
            4 => Self::CmdNotValid,
            5 => Self::SubCmdNotValid,
            6 => Self::CmdNotProcessed,
            7 => Self::DigitalOutputIdxBankNotValid,
            8 => Self::DigitalOutputIdxPinNotValid,
            9 => Self::IdxPinNotValid,
            10 => Self::PinTypeNotValid,
            11 => Self::TimeoutOnResponse,
            12 => Self::IncorrectPayloadSize,
            13 => Self::NoAffinityWithResponsePacket,
            14 => Self::CmdNotExpected,
            15 => Self::IncorrectParametersNumber,
            16 => Self::IncorrectParameterType,
            17 => Self::IncompleteParameters,
            18 => Self::WrongNumberExpectedResponsePackets,
            19 => Self::ImuGenericError,
            20 => Self::ImuCommunicationError,
            21 => Self::ImuNotConnected,
            22 => Self::ImuCmdNotExecuted,
            23 => Self::ImuDisabled,
            24 => Self::SerialDeviceGenericError,
            25 => Self::SerialDevicePortNotOpen,
            254 => Self::NoExternalProcessingNecessary,
            _ => Self::GenericError,
        }
    }
}

/// Wire pin-type codes carried in value packets.
pub const WIRE_PIN_DIGITAL_INPUT: u8 = 1;
pub const WIRE_PIN_ANALOG_INPUT: u8 = 2;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    #[error("Frame truncated: got {0} bytes, expected {PACKET_LENGTH}")]
    Truncated(usize),

    #[error("Start header not present")]
    StartHeaderNotPresent,

    #[error("Stop header not present")]
    StopHeaderNotPresent,

    #[error("CRC mismatch: frame carries {carried:#06x}, computed {computed:#06x}")]
    CrcMismatch { carried: u16, computed: u16 },
}

/// One decoded (or to-be-encoded) wire frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SenseiFrame {
    pub cmd: u8,
    pub sub_cmd: u8,
    pub continuation: u8,
    pub timestamp: u32,
    pub payload: [u8; PAYLOAD_LENGTH],
}

impl SenseiFrame {
    pub fn new(cmd: u8, sub_cmd: u8, timestamp: u32) -> Self {
        Self {
            cmd,
            sub_cmd,
            continuation: 0,
            timestamp,
            payload: [0; PAYLOAD_LENGTH],
        }
    }

    /// Composite identity used to pair transmissions with acks.
    pub fn uuid(&self) -> u64 {
        u64::from(self.timestamp)
            | (u64::from(self.cmd) << 32)
            | (u64::from(self.sub_cmd) << 48)
    }

    pub fn crc(&self) -> u16 {
        let mut sum = u16::from(self.cmd).wrapping_add(u16::from(self.sub_cmd));
        sum = sum.wrapping_add(u16::from(self.continuation));
        for byte in self.timestamp.to_le_bytes() {
            sum = sum.wrapping_add(u16::from(byte));
        }
        for byte in self.payload {
            sum = sum.wrapping_add(u16::from(byte));
        }
        sum
    }

    pub fn encode(&self) -> [u8; PACKET_LENGTH] {
        let mut bytes = [0u8; PACKET_LENGTH];
        bytes[..3].copy_from_slice(&START_SIGNATURE);
        bytes[CMD_OFFSET] = self.cmd;
        bytes[SUB_CMD_OFFSET] = self.sub_cmd;
        bytes[CONTINUATION_OFFSET] = self.continuation;
        bytes[TIMESTAMP_OFFSET..TIMESTAMP_OFFSET + 4]
            .copy_from_slice(&self.timestamp.to_le_bytes());
        bytes[PAYLOAD_OFFSET..PAYLOAD_OFFSET + PAYLOAD_LENGTH].copy_from_slice(&self.payload);
        bytes[CRC_OFFSET..CRC_OFFSET + 2].copy_from_slice(&self.crc().to_le_bytes());
        bytes[STOP_OFFSET..].copy_from_slice(&STOP_SIGNATURE);
        bytes
    }

    /// Validates signatures and checksum, then decodes.
    pub fn parse(bytes: &[u8]) -> Result<Self, FrameError> {
        if bytes.len() < PACKET_LENGTH {
            return Err(FrameError::Truncated(bytes.len()));
        }
        if bytes[..3] != START_SIGNATURE {
            return Err(FrameError::StartHeaderNotPresent);
        }
        if bytes[STOP_OFFSET..PACKET_LENGTH] != STOP_SIGNATURE {
            return Err(FrameError::StopHeaderNotPresent);
        }
        let mut payload = [0u8; PAYLOAD_LENGTH];
        payload.copy_from_slice(&bytes[PAYLOAD_OFFSET..PAYLOAD_OFFSET + PAYLOAD_LENGTH]);
        let frame = Self {
            cmd: bytes[CMD_OFFSET],
            sub_cmd: bytes[SUB_CMD_OFFSET],
            continuation: bytes[CONTINUATION_OFFSET],
            timestamp: u32::from_le_bytes(
                bytes[TIMESTAMP_OFFSET..TIMESTAMP_OFFSET + 4].try_into().unwrap(),
            ),
            payload,
        };
        let carried = u16::from_le_bytes(bytes[CRC_OFFSET..CRC_OFFSET + 2].try_into().unwrap());
        let computed = frame.crc();
        if carried != computed {
            return Err(FrameError::CrcMismatch { carried, computed });
        }
        Ok(frame)
    }
}

/// Cheap validity check for a received buffer.
pub fn verify_message(bytes: &[u8]) -> bool {
    SenseiFrame::parse(bytes).is_ok()
}

// --- Payload structures (packed, little-endian) ---

/// Payload of a `Value` frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValuePayload {
    pub pin_id: u16,
    pub value: u16,
    pub pin_type: u8,
}

impl ValuePayload {
    pub const SIZE: usize = 5;

    pub fn write_to(&self, payload: &mut [u8; PAYLOAD_LENGTH]) {
        payload[0..2].copy_from_slice(&self.pin_id.to_le_bytes());
        payload[2..4].copy_from_slice(&self.value.to_le_bytes());
        payload[4] = self.pin_type;
    }

    pub fn read_from(payload: &[u8]) -> Self {
        Self {
            pin_id: u16::from_le_bytes(payload[0..2].try_into().unwrap()),
            value: u16::from_le_bytes(payload[2..4].try_into().unwrap()),
            pin_type: payload[4],
        }
    }
}

/// Payload of a `ValueImu` frame: pin index plus one orientation quaternion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImuValuePayload {
    pub pin_id: u16,
    pub qw: f32,
    pub qx: f32,
    pub qy: f32,
    pub qz: f32,
}

impl ImuValuePayload {
    pub const SIZE: usize = 18;

    pub fn write_to(&self, payload: &mut [u8; PAYLOAD_LENGTH]) {
        payload[0..2].copy_from_slice(&self.pin_id.to_le_bytes());
        payload[2..6].copy_from_slice(&self.qw.to_le_bytes());
        payload[6..10].copy_from_slice(&self.qx.to_le_bytes());
        payload[10..14].copy_from_slice(&self.qy.to_le_bytes());
        payload[14..18].copy_from_slice(&self.qz.to_le_bytes());
    }

    pub fn read_from(payload: &[u8]) -> Self {
        Self {
            pin_id: u16::from_le_bytes(payload[0..2].try_into().unwrap()),
            qw: f32::from_le_bytes(payload[2..6].try_into().unwrap()),
            qx: f32::from_le_bytes(payload[6..10].try_into().unwrap()),
            qy: f32::from_le_bytes(payload[10..14].try_into().unwrap()),
            qz: f32::from_le_bytes(payload[14..18].try_into().unwrap()),
        }
    }
}

/// Payload of an `Ack` frame. The acked packet's identity is the ack frame's
/// echoed timestamp plus this command pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AckPayload {
    pub status: StatusCode,
    pub cmd: u8,
    pub sub_cmd: u8,
}

impl AckPayload {
    pub fn write_to(&self, payload: &mut [u8; PAYLOAD_LENGTH]) {
        payload[0] = self.status as u8;
        payload[1] = self.cmd;
        payload[2] = self.sub_cmd;
    }

    pub fn read_from(payload: &[u8]) -> Self {
        Self {
            status: StatusCode::from_u8(payload[0]),
            cmd: payload[1],
            sub_cmd: payload[2],
        }
    }

    /// Reconstructs the UUID of the packet this ack refers to.
    pub fn acked_uuid(&self, echoed_timestamp: u32) -> u64 {
        u64::from(echoed_timestamp)
            | (u64::from(self.cmd) << 32)
            | (u64::from(self.sub_cmd) << 48)
    }
}

/// Payload of a `ConfigurePin` frame. One frame carries the full parameter
/// block; the sub-command identifies which class actually changed.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PinConfigurationPayload {
    pub pin_index: u16,
    pub pin_type: u8,
    pub pin_enabled: u8,
    pub sending_mode: u8,
    pub delta_ticks: u16,
    pub adc_bits: u8,
    pub filter_order: u8,
    pub lowpass_cutoff: f32,
    pub slider_threshold: u16,
}

impl PinConfigurationPayload {
    pub const SIZE: usize = 15;

    pub fn write_to(&self, payload: &mut [u8; PAYLOAD_LENGTH]) {
        payload[0..2].copy_from_slice(&self.pin_index.to_le_bytes());
        payload[2] = self.pin_type;
        payload[3] = self.pin_enabled;
        payload[4] = self.sending_mode;
        payload[5..7].copy_from_slice(&self.delta_ticks.to_le_bytes());
        payload[7] = self.adc_bits;
        payload[8] = self.filter_order;
        payload[9..13].copy_from_slice(&self.lowpass_cutoff.to_le_bytes());
        payload[13..15].copy_from_slice(&self.slider_threshold.to_le_bytes());
    }

    pub fn read_from(payload: &[u8]) -> Self {
        Self {
            pin_index: u16::from_le_bytes(payload[0..2].try_into().unwrap()),
            pin_type: payload[2],
            pin_enabled: payload[3],
            sending_mode: payload[4],
            delta_ticks: u16::from_le_bytes(payload[5..7].try_into().unwrap()),
            adc_bits: payload[7],
            filter_order: payload[8],
            lowpass_cutoff: f32::from_le_bytes(payload[9..13].try_into().unwrap()),
            slider_threshold: u16::from_le_bytes(payload[13..15].try_into().unwrap()),
        }
    }
}

/// Reassembles two-part payloads. The continuation frame arrives first with
/// `continuation = 1`; the directly following non-continuation frame
/// completes the pair. Pairing is strict: an unexpected second continuation
/// simply restarts the sequence.
#[derive(Debug, Default)]
pub struct MessageConcatenator {
    pending: Option<[u8; PAYLOAD_LENGTH]>,
}

impl MessageConcatenator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one frame; returns the complete payload when available.
    pub fn add(&mut self, frame: &SenseiFrame) -> Option<Vec<u8>> {
        if frame.continuation != 0 {
            self.pending = Some(frame.payload);
            return None;
        }
        match self.pending.take() {
            Some(first) => {
                let mut full = Vec::with_capacity(PAYLOAD_LENGTH * 2);
                full.extend_from_slice(&first);
                full.extend_from_slice(&frame.payload);
                Some(full)
            }
            None => Some(frame.payload.to_vec()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_frame() -> SenseiFrame {
        let mut frame = SenseiFrame::new(SenseiCmd::ConfigurePin as u8, 4, 0x01020304);
        PinConfigurationPayload {
            pin_index: 3,
            delta_ticks: 100,
            ..Default::default()
        }
        .write_to(&mut frame.payload);
        frame
    }

    #[test]
    fn test_encode_parse_round_trip() {
        let frame = sample_frame();
        let bytes = frame.encode();
        assert_eq!(bytes.len(), PACKET_LENGTH);
        assert!(verify_message(&bytes));
        let parsed = SenseiFrame::parse(&bytes).unwrap();
        assert_eq!(parsed, frame);
    }

    /// Flipping any single byte of the protected region invalidates the
    /// frame (headers fail signature checks, everything else fails the CRC).
    #[test]
    fn test_single_byte_corruption_is_detected() {
        let bytes = sample_frame().encode();
        // Every byte except the reserved filler participates in
        // verification; flipping a CRC byte fails too since the content no
        // longer sums to it.
        for position in (0..PACKET_LENGTH).filter(|&p| p != 6) {
            let mut corrupted = bytes;
            corrupted[position] ^= 0x40;
            assert!(
                !verify_message(&corrupted),
                "corruption at byte {} went undetected",
                position
            );
        }
    }

    #[test]
    fn test_truncated_frame_is_rejected() {
        let bytes = sample_frame().encode();
        assert_eq!(
            SenseiFrame::parse(&bytes[..20]),
            Err(FrameError::Truncated(20))
        );
    }

    #[test]
    fn test_uuid_composition() {
        let frame = SenseiFrame::new(100, 4, 0xAABBCCDD);
        let uuid = frame.uuid();
        assert_eq!(uuid & 0xFFFF_FFFF, 0xAABB_CCDD);
        assert_eq!((uuid >> 32) & 0xFF, 100);
        assert_eq!((uuid >> 48) & 0xFF, 4);
    }

    #[test]
    fn test_ack_uuid_matches_transmitted_frame() {
        let sent = SenseiFrame::new(SenseiCmd::ConfigurePin as u8, 2, 77);
        let ack_payload = AckPayload {
            status: StatusCode::Ok,
            cmd: sent.cmd,
            sub_cmd: sent.sub_cmd,
        };
        assert_eq!(ack_payload.acked_uuid(77), sent.uuid());
    }

    #[test]
    fn test_status_code_round_trip_and_unknown_collapse() {
        assert_eq!(StatusCode::from_u8(3), StatusCode::CrcNotCorrect);
        assert_eq!(StatusCode::from_u8(254), StatusCode::NoExternalProcessingNecessary);
        assert_eq!(StatusCode::from_u8(99), StatusCode::GenericError);
    }

    #[test]
    fn test_pin_configuration_payload_round_trip() {
        let config = PinConfigurationPayload {
            pin_index: 9,
            pin_type: 2,
            pin_enabled: 1,
            sending_mode: 3,
            delta_ticks: 250,
            adc_bits: 12,
            filter_order: 4,
            lowpass_cutoff: 125.5,
            slider_threshold: 10,
        };
        let mut payload = [0u8; PAYLOAD_LENGTH];
        config.write_to(&mut payload);
        assert_eq!(PinConfigurationPayload::read_from(&payload), config);
    }

    #[test]
    fn test_imu_payload_round_trip() {
        let imu = ImuValuePayload {
            pin_id: 1,
            qw: 1.0,
            qx: 0.0,
            qy: -0.5,
            qz: 0.25,
        };
        let mut payload = [0u8; PAYLOAD_LENGTH];
        imu.write_to(&mut payload);
        assert_eq!(ImuValuePayload::read_from(&payload), imu);
    }

    #[test]
    fn test_concatenator_single_frame_passthrough() {
        let mut concatenator = MessageConcatenator::new();
        let frame = sample_frame();
        let payload = concatenator.add(&frame).expect("single frame is complete");
        assert_eq!(payload.len(), PAYLOAD_LENGTH);
    }

    #[test]
    fn test_concatenator_pairs_two_part_messages() {
        let mut concatenator = MessageConcatenator::new();
        let mut first = SenseiFrame::new(100, 1, 5);
        first.continuation = 1;
        first.payload[0] = 0xAA;
        let mut second = SenseiFrame::new(100, 1, 6);
        second.payload[0] = 0xBB;

        assert!(concatenator.add(&first).is_none());
        let full = concatenator.add(&second).expect("pair completes");
        assert_eq!(full.len(), PAYLOAD_LENGTH * 2);
        assert_eq!(full[0], 0xAA);
        assert_eq!(full[PAYLOAD_LENGTH], 0xBB);
    }
}
