use super::*;

#[test]
fn test_decode_scalars() {
    let buf = 0xDEADBEEF_u32.to_le_bytes();
    assert_eq!(decode_u32(&buf, "u32").unwrap(), 0xDEADBEEF);
    assert!(decode_u32(&buf[..3], "u32").is_err());

    let buf = 0x0123456789ABCDEF_u64.to_le_bytes();
    assert_eq!(decode_u64(&buf, "u64").unwrap(), 0x0123456789ABCDEF);
    assert!(decode_u64(&buf[..7], "u64").is_err());
}

#[test]
fn test_file_helpers() {
    use std::io::{Read, Seek, SeekFrom};

    let file = {
        let mut loc = std::env::temp_dir();
        loc.push("plinth-util-mod-test");
        loc.push("helpers.data");
        loc.into_os_string()
    };

    let mut fd = create_file_a(&file).unwrap();
    sync_write(&mut fd, b"hello world").unwrap();

    let mut fd = open_file_a(&file).unwrap();
    sync_write(&mut fd, b", again").unwrap();

    let mut fd = open_file_r(&file).unwrap();
    let buf = read_file!(&mut fd, SeekFrom::Start(0), 18, "read helpers").unwrap();
    assert_eq!(&buf, b"hello world, again");

    // create_file_a truncates an existing file.
    let fd = create_file_a(&file).unwrap();
    assert_eq!(fd.metadata().unwrap().len(), 0);
}
