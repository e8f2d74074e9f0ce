use bytes::Bytes;

/// One NAL unit, header decoded, body still escaped.
#[derive(Debug, Clone)]
pub struct NalUnit {
    pub nal_type: u8,
    pub nal_ref_idc: u8,
    pub data: Bytes,
}

impl NalUnit {
    pub fn new(data: Bytes) -> Self {
        let header = data[0];
        Self {
            nal_type: header & 0x1F,
            nal_ref_idc: (header >> 5) & 0x03,
            data,
        }
    }

    pub fn is_keyframe(&self) -> bool {
        self.nal_type == 5
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NalUnitType {
    CodedSliceNonIdr = 1,
    CodedSliceDataPartitionA = 2,
    CodedSliceDataPartitionB = 3,
    CodedSliceDataPartitionC = 4,
    CodedSliceIdr = 5,
    Sei = 6,
    Sps = 7,
    Pps = 8,
    AccessUnitDelimiter = 9,
    EndOfSequence = 10,
    EndOfStream = 11,
    FillerData = 12,
    Unspecified = 0,
}

impl From<u8> for NalUnitType {
    fn from(value: u8) -> Self {
        match value {
            1 => NalUnitType::CodedSliceNonIdr,
            2 => NalUnitType::CodedSliceDataPartitionA,
            3 => NalUnitType::CodedSliceDataPartitionB,
            4 => NalUnitType::CodedSliceDataPartitionC,
            5 => NalUnitType::CodedSliceIdr,
            6 => NalUnitType::Sei,
            7 => NalUnitType::Sps,
            8 => NalUnitType::Pps,
            9 => NalUnitType::AccessUnitDelimiter,
            10 => NalUnitType::EndOfSequence,
            11 => NalUnitType::EndOfStream,
            12 => NalUnitType::FillerData,
            _ => NalUnitType::Unspecified,
        }
    }
}

impl NalUnitType {
    pub fn describe(self) -> &'static str {
        match self {
            NalUnitType::CodedSliceNonIdr => "coded slice (non-IDR)",
            NalUnitType::CodedSliceDataPartitionA => "slice data partition A",
            NalUnitType::CodedSliceDataPartitionB => "slice data partition B",
            NalUnitType::CodedSliceDataPartitionC => "slice data partition C",
            NalUnitType::CodedSliceIdr => "coded slice (IDR)",
            NalUnitType::Sei => "SEI",
            NalUnitType::Sps => "sequence parameter set",
            NalUnitType::Pps => "picture parameter set",
            NalUnitType::AccessUnitDelimiter => "access unit delimiter",
            NalUnitType::EndOfSequence => "end of sequence",
            NalUnitType::EndOfStream => "end of stream",
            NalUnitType::FillerData => "filler data",
            NalUnitType::Unspecified => "unspecified",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SpsInfo {
    pub profile_idc: u8,
    pub level_idc: u8,
    pub chroma_format_idc: u32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Default)]
pub struct PpsInfo {
    pub pic_parameter_set_id: u32,
    pub seq_parameter_set_id: u32,
    pub entropy_coding_mode: bool,
}

/// First fields of a slice header, enough to classify the picture.
#[derive(Debug, Clone)]
pub struct SliceInfo {
    pub first_mb_in_slice: u32,
    pub slice_type: u32,
    pub pic_parameter_set_id: u32,
}

impl SliceInfo {
    pub fn slice_type_name(&self) -> &'static str {
        match self.slice_type % 5 {
            0 => "P",
            1 => "B",
            2 => "I",
            3 => "SP",
            4 => "SI",
            _ => unreachable!(),
        }
    }
}

/// One SEI message, type/size TLV only.
#[derive(Debug, Clone)]
pub struct SeiMessage {
    pub payload_type: u32,
    pub payload_size: u32,
}
