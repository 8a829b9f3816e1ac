//! DDM Protocol Constants and Code Points
//!
//! Constants for the Distributed Data Management request stream: the GDS
//! header values, the architected DDM code points used in the handshake,
//! and the S38 extension code points for record-level file access. Values
//! are dictated by the DDM architecture and the host's S38 extensions and
//! are not redesignable.

/// GDS (General Data Stream) identifier carried in every DDM frame header
pub const GDS_ID: u8 = 0xD0;

/// Format flags: request DSS, reply expected
pub const FMT_RQSDSS: u8 = 0x01;
/// Format flags: request DSS, no reply expected (fire and forget)
pub const FMT_RQSDSS_NOREPLY: u8 = 0x05;

/// Fixed DDM header size (length, GDS id, format, correlation id)
pub const HEADER_SIZE: usize = 6;

/// Architected DDM code points (handshake and management)
pub const CP_EXCSAT: u16 = 0x1041; // Exchange server attributes
pub const CP_EXCSATRD: u16 = 0x1443; // Exchange server attributes reply
pub const CP_EXTNAM: u16 = 0x115E; // External name
pub const CP_SRVCLSNM: u16 = 0x1147; // Server class name
pub const CP_SRVRLSLV: u16 = 0x115A; // Server release level
pub const CP_MGRLVLLS: u16 = 0x1404; // Manager level list
pub const CP_DCLNAM: u16 = 0x1136; // Declared name
pub const CP_FILNAM: u16 = 0x110E; // File name
pub const CP_SVRCOD: u16 = 0x1149; // Severity code

/// S38 extension code points (record-level file access)
pub const CP_S38OPEN: u16 = 0xD011; // Open declared file
pub const CP_S38CLOSE: u16 = 0xD004; // Close declared file
pub const CP_S38GET: u16 = 0xD005; // Get record (sequential / option driven)
pub const CP_S38GETD: u16 = 0xD00C; // Get record at position (by RRN)
pub const CP_S38GETK: u16 = 0xD00B; // Get record by key
pub const CP_S38PUTM: u16 = 0xD013; // Put (append) record
pub const CP_S38UPDAT: u16 = 0xD019; // Update current record
pub const CP_S38DEL: u16 = 0xD007; // Delete current record
pub const CP_S38FEOD: u16 = 0xD00A; // Force end of data
pub const CP_S38CMT: u16 = 0xD01B; // Commit
pub const CP_S38RLLBCK: u16 = 0xD01C; // Rollback

/// S38 parameter term code points
pub const CP_S38OPTL: u16 = 0xD024; // Option list (type/share/data bytes)
pub const CP_S38KEYVAL: u16 = 0xD027; // Encoded key field values
pub const CP_S38KEYCNT: u16 = 0xD028; // Number of key fields in the search
pub const CP_S38RRN: u16 = 0xD022; // Relative record number
pub const CP_S38RECDTA: u16 = 0xD020; // Record data
pub const CP_S38SHR: u16 = 0xD025; // Share option
pub const CP_S38UFCB: u16 = 0xD021; // User file control block

/// Option byte values for the S38 option list term
pub mod options {
    /// Record retrieval type
    pub const TYPE_RANDOM: u8 = 0x00;
    pub const TYPE_SEQUENTIAL: u8 = 0x01;
    pub const TYPE_NEXT: u8 = 0x02;
    pub const TYPE_PREVIOUS: u8 = 0x03;
    pub const TYPE_FIRST: u8 = 0x04;
    pub const TYPE_LAST: u8 = 0x05;

    /// Share option
    pub const SHARE_READ: u8 = 0x00;
    pub const SHARE_UPDATE: u8 = 0x01;
    pub const SHARE_EXCLUSIVE: u8 = 0x02;

    /// Data option
    pub const DATA_DATA: u8 = 0x00;
    pub const DATA_NULL: u8 = 0x01;
    pub const DATA_RECORD_INFO: u8 = 0x02;
}

/// Human-readable name for a code point, for logging and the dump tool
pub fn code_point_name(cp: u16) -> &'static str {
    match cp {
        CP_EXCSAT => "EXCSAT",
        CP_EXCSATRD => "EXCSATRD",
        CP_EXTNAM => "EXTNAM",
        CP_SRVCLSNM => "SRVCLSNM",
        CP_SRVRLSLV => "SRVRLSLV",
        CP_MGRLVLLS => "MGRLVLLS",
        CP_DCLNAM => "DCLNAM",
        CP_FILNAM => "FILNAM",
        CP_SVRCOD => "SVRCOD",
        CP_S38OPEN => "S38OPEN",
        CP_S38CLOSE => "S38CLOSE",
        CP_S38GET => "S38GET",
        CP_S38GETD => "S38GETD",
        CP_S38GETK => "S38GETK",
        CP_S38PUTM => "S38PUTM",
        CP_S38UPDAT => "S38UPDAT",
        CP_S38DEL => "S38DEL",
        CP_S38FEOD => "S38FEOD",
        CP_S38CMT => "S38CMT",
        CP_S38RLLBCK => "S38RLLBCK",
        CP_S38OPTL => "S38OPTL",
        CP_S38KEYVAL => "S38KEYVAL",
        CP_S38KEYCNT => "S38KEYCNT",
        CP_S38RRN => "S38RRN",
        CP_S38RECDTA => "S38RECDTA",
        CP_S38SHR => "S38SHR",
        CP_S38UFCB => "S38UFCB",
        _ => "UNKNOWN",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_point_names() {
        assert_eq!(code_point_name(CP_S38OPEN), "S38OPEN");
        assert_eq!(code_point_name(CP_DCLNAM), "DCLNAM");
        assert_eq!(code_point_name(0x0000), "UNKNOWN");
    }
}
