use crate::constant::*;

#[test]
fn capability_flag_operations() {
    let mut caps = CapabilityFlags::new(CapabilityFlags::CLIENT_PROTOCOL_41);
    assert!(caps.has(CapabilityFlags::CLIENT_PROTOCOL_41));
    assert!(!caps.has(CapabilityFlags::CLIENT_SSL));

    caps.set(CapabilityFlags::CLIENT_SSL);
    assert!(caps.has(CapabilityFlags::CLIENT_SSL));
    caps.unset(CapabilityFlags::CLIENT_SSL);
    assert!(!caps.has(CapabilityFlags::CLIENT_SSL));
}

#[test]
fn always_enabled_capabilities() {
    let caps = CapabilityFlags::new(CapabilityFlags::ALWAYS_ENABLED);
    assert!(caps.has(CapabilityFlags::CLIENT_PROTOCOL_41));
    assert!(caps.has(CapabilityFlags::CLIENT_SECURE_CONNECTION));
    assert!(caps.has(CapabilityFlags::CLIENT_PLUGIN_AUTH));
    assert!(caps.has(CapabilityFlags::CLIENT_MULTI_RESULTS));
    assert!(caps.has(CapabilityFlags::CLIENT_TRANSACTIONS));
    assert!(caps.has(CapabilityFlags::CLIENT_LONG_PASSWORD));
    assert!(caps.has(CapabilityFlags::CLIENT_LOCAL_FILES));
    assert!(caps.has(CapabilityFlags::CLIENT_CONNECT_ATTRS));
    // Negotiated per config, never unconditionally.
    assert!(!caps.has(CapabilityFlags::CLIENT_SSL));
    assert!(!caps.has(CapabilityFlags::CLIENT_MULTI_STATEMENTS));
    assert!(!caps.has(CapabilityFlags::CLIENT_FOUND_ROWS));
}

#[test]
fn status_flags() {
    let status = StatusFlags::new(0x0008 | 0x0002);
    assert!(status.more_results());
    assert!(status.has(StatusFlags::SERVER_STATUS_AUTOCOMMIT));
    assert!(!status.has(StatusFlags::SERVER_STATUS_IN_TRANS));
}

#[test]
fn column_type_mapping() {
    assert_eq!(ColumnType::from_u8(0x01), Some(ColumnType::MYSQL_TYPE_TINY));
    assert_eq!(ColumnType::from_u8(0xF5), Some(ColumnType::MYSQL_TYPE_JSON));
    assert_eq!(
        ColumnType::from_u8(0xFF),
        Some(ColumnType::MYSQL_TYPE_GEOMETRY)
    );
    // Unassigned gap between the classic and extended ranges.
    assert_eq!(ColumnType::from_u8(0x50), None);
    assert_eq!(ColumnType::from_u8(0xF4), None);
}

#[test]
fn command_bytes() {
    assert_eq!(Command::Quit as u8, 0x01);
    assert_eq!(Command::InitDb as u8, 0x02);
    assert_eq!(Command::Query as u8, 0x03);
    assert_eq!(Command::Ping as u8, 0x0E);
    assert_eq!(Command::StmtPrepare as u8, 0x16);
    assert_eq!(Command::StmtExecute as u8, 0x17);
    assert_eq!(Command::StmtSendLongData as u8, 0x18);
    assert_eq!(Command::StmtClose as u8, 0x19);
}

#[test]
fn packet_limits() {
    assert_eq!(MAX_PACKET_SIZE, 16_777_215);
    assert_eq!(MAX_CACHED_BUF_SIZE, 262_144);
}
