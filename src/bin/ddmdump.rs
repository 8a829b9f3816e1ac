//! Dump built DDM request frames as annotated hex
//!
//! Builds one sample of every request the encoder supports and prints the
//! frame bytes with the header fields and operation code point decoded,
//! for eyeballing against protocol traces.

use anyhow::{Context, Result};

use ddm400r::libddm::{
    code_point_name, request, verify_lengths, DeclaredName, KeyField, KeyFieldType, KeyValue,
    OptionList,
};

fn main() -> Result<()> {
    env_logger::init();

    let dclnam = DeclaredName::new("DUMPFILE").context("declared name")?;
    let opts = OptionList::default();
    let key_fields = [
        KeyField::new("CUSTNO", KeyFieldType::Packed { digits: 7 }),
        KeyField::new("REGION", KeyFieldType::Char { width: 3, variable_length: false }),
    ];
    let key_values = [
        Some(KeyValue::Number(1234567)),
        Some(KeyValue::Text("NE".to_string())),
    ];

    let samples: Vec<(&str, Vec<u8>)> = vec![
        ("open", request::open(&dclnam, "MYLIB/CUSTMAST", opts, 1)?),
        ("get", request::get(&dclnam, opts, 2)?),
        ("get_at_position", request::get_at_position(&dclnam, 42, opts, 3)?),
        (
            "get_by_key",
            request::get_by_key(&dclnam, &key_fields, &key_values, opts, 4)?,
        ),
        ("put", request::put(&dclnam, b"sample record", 5)?),
        ("update", request::update(&dclnam, b"updated record", opts, 6)?),
        ("delete", request::delete(&dclnam, opts, 7)?),
        ("force_end_of_data", request::force_end_of_data(&dclnam, 8)?),
        ("commit", request::commit(9)?),
        ("rollback", request::rollback(10)?),
        ("close", request::close(&dclnam, 11)?),
        ("close_no_reply", request::close_no_reply(&dclnam, 12)?),
    ];

    for (label, frame) in samples {
        print_frame(label, &frame);
        if let Err(e) = verify_lengths(&frame) {
            anyhow::bail!("frame '{label}' failed length verification: {e}");
        }
    }
    Ok(())
}

fn print_frame(label: &str, frame: &[u8]) {
    let length = u16::from_be_bytes([frame[0], frame[1]]);
    let format = frame[3];
    let correlation = u16::from_be_bytes([frame[4], frame[5]]);
    // The operation code point sits at bytes 8..10, after the outer term's
    // 2-byte length prefix.
    let code_point = u16::from_be_bytes([frame[8], frame[9]]);

    println!(
        "== {label}: {length} bytes, format 0x{format:02X}, correlation {correlation}, {} (0x{code_point:04X})",
        code_point_name(code_point)
    );
    for (i, chunk) in frame.chunks(16).enumerate() {
        print!("  {:04x}: ", i * 16);
        for b in chunk {
            print!("{b:02x} ");
        }
        println!();
    }
    println!();
}
