//! Integration tests: schema + frames + calibration through the record pipeline, streaming and
//! buffered, into in-memory and CSV sinks.

use satframe::frame::FrameReader;
use satframe::{
    CalibrationError, DelimitedWriter, Error, FrameDecoder, FunctionTable, InputError, NoPlugin,
    PluginError, Record, RecordPipeline, Schema, Value,
};
use std::io::Cursor;

const HOUSEKEEPING: &str = r#"
settings {
    frame_size: 8;
    endian: big;
}

subsystem PCS @ 0 {
    mode: u8 @ 0;
    vBat: u16 @ 1 {
        expr: "raw * 0.01 - 1";
        units: "V";
        round: 2;
    }
    temp: i8 @ 3;
}

subsystem CDH @ 4 {
    OBT: u32 @ 0 { func: obt_seconds_to_unix; }
}
"#;

fn frames(rows: &[[u8; 8]]) -> Vec<u8> {
    rows.iter().flat_map(|r| r.iter().copied()).collect()
}

fn run_to_vec(schema: &Schema, plugin: &FunctionTable, data: &[u8]) -> satframe::error::Result<Vec<Record>> {
    let mut sink = Vec::new();
    RecordPipeline::new(schema, plugin).run(Cursor::new(data), data.len() as u64, &mut sink)?;
    Ok(sink)
}

fn schema_with(settings: &str, fields: &str) -> Schema {
    let src = format!("settings {{ {} }} subsystem S @ 0 {{ {} }}", settings, fields);
    Schema::from_source(&src).unwrap_or_else(|e| panic!("schema: {}", e))
}

// ==================== Decode ====================

#[test]
fn decode_housekeeping_frames() {
    let schema = Schema::from_source(HOUSEKEEPING).expect("schema");
    let plugin = FunctionTable::with_builtins();
    let data = frames(&[
        [2, 0x01, 0xF4, 0xFE, 0, 0, 0, 10],
        [3, 0x02, 0x58, 0x05, 0, 0, 0, 20],
    ]);
    let records = run_to_vec(&schema, &plugin, &data).expect("run");
    assert_eq!(records.len(), 2);

    let r = &records[0];
    assert_eq!(r.frame_index, None);
    assert_eq!(r.get(&schema, "PCS.mode"), Some(&Value::U8(2)));
    assert_eq!(r.get(&schema, "PCS.vBat"), Some(&Value::F64(4.0)));
    assert_eq!(r.get(&schema, "PCS.temp"), Some(&Value::I8(-2)));
    assert_eq!(r.get(&schema, "CDH.OBT"), Some(&Value::F64(315_964_810.0)));

    let r = &records[1];
    assert_eq!(r.get(&schema, "PCS.vBat"), Some(&Value::F64(5.0)));
    assert_eq!(r.get(&schema, "PCS.temp"), Some(&Value::I8(5)));
    assert_eq!(r.get(&schema, "CDH.OBT"), Some(&Value::F64(315_964_820.0)));
}

#[test]
fn decoding_is_deterministic() {
    let schema = Schema::from_source(HOUSEKEEPING).expect("schema");
    let decoder = FrameDecoder::new(&schema);
    let frame = [9, 0xAB, 0xCD, 0x80, 1, 2, 3, 4];
    assert_eq!(decoder.decode(&frame).unwrap(), decoder.decode(&frame).unwrap());
}

#[test]
fn decoder_rejects_wrong_frame_length() {
    let schema = Schema::from_source(HOUSEKEEPING).expect("schema");
    let decoder = FrameDecoder::new(&schema);
    assert!(decoder.decode(&[0u8; 7]).is_err());
}

#[test]
fn one_record_per_frame() {
    let schema = schema_with("frame_size: 2;", "x: u8 @ 0;");
    let plugin = FunctionTable::new();
    for n in [0usize, 1, 5, 64] {
        let data = vec![7u8; n * 2];
        assert_eq!(run_to_vec(&schema, &plugin, &data).expect("run").len(), n);
    }
}

#[test]
fn endianness_selects_byte_order() {
    let src = r#"
        settings { frame_size: 2; endian: little; }
        subsystem B @ 0 big { v: u16 @ 0; }
        subsystem L @ 0 { v: u16 @ 0; }
    "#;
    let schema = Schema::from_source(src).expect("schema");
    let records = run_to_vec(&schema, &FunctionTable::new(), &[0x00, 0x01]).expect("run");
    assert_eq!(records[0].values, vec![Value::U16(1), Value::U16(256)]);
}

#[test]
fn floats_and_wide_integers() {
    let schema = schema_with(
        "frame_size: 16; endian: big;",
        "f: f32 @ 0; d: i32 @ 4; q: u64 @ 8;",
    );
    let mut data = Vec::new();
    data.extend_from_slice(&1.5f32.to_be_bytes());
    data.extend_from_slice(&(-70_000i32).to_be_bytes());
    data.extend_from_slice(&u64::MAX.to_be_bytes());
    let records = run_to_vec(&schema, &FunctionTable::new(), &data).expect("run");
    assert_eq!(
        records[0].values,
        vec![Value::F32(1.5), Value::I32(-70_000), Value::U64(u64::MAX)]
    );
}

#[test]
fn bytes_field_is_passed_through() {
    let schema = schema_with("frame_size: 4;", "tag: bytes(3) @ 1;");
    let records = run_to_vec(&schema, &FunctionTable::new(), &[0, 0xDE, 0xAD, 0x01]).expect("run");
    assert_eq!(records[0].values, vec![Value::Bytes(vec![0xDE, 0xAD, 0x01])]);
    assert_eq!(records[0].values[0].to_string(), "dead01");
}

// ==================== Calibration ====================

#[test]
fn rounding_to_two_digits() {
    let schema = schema_with(
        "frame_size: 4; endian: big;",
        r#"x: u32 @ 0 { expr: "raw / 100000"; round: 2; }"#,
    );
    let records = run_to_vec(&schema, &FunctionTable::new(), &123_456u32.to_be_bytes()).expect("run");
    assert_eq!(records[0].values, vec![Value::F64(1.23)]);
}

#[test]
fn rounding_ties_to_even() {
    let schema = schema_with("frame_size: 1;", r#"x: u8 @ 0 { expr: "raw / 2"; round: 0; }"#);
    let records = run_to_vec(&schema, &FunctionTable::new(), &[1, 3, 5]).expect("run");
    let values: Vec<_> = records.iter().map(|r| r.values[0].clone()).collect();
    assert_eq!(values, vec![Value::F64(0.0), Value::F64(2.0), Value::F64(2.0)]);
}

#[test]
fn calibration_failure_reports_context() {
    let src = r#"
        settings { frame_size: 4; }
        subsystem S @ 2 { x: u8 @ 1 { expr: "100 / raw"; } }
    "#;
    let schema = Schema::from_source(src).expect("schema");
    let data = [1, 1, 1, 1, 0, 0, 0, 0];
    match run_to_vec(&schema, &FunctionTable::new(), &data) {
        Err(Error::Calibration {
            field,
            frame_index,
            offset,
            source,
        }) => {
            assert_eq!(field, "S.x");
            assert_eq!(frame_index, 1);
            assert_eq!(offset, 7);
            assert_eq!(source, CalibrationError::Eval(satframe::EvalError::DivisionByZero));
        }
        other => panic!("expected calibration error, got {:?}", other),
    }
}

#[test]
fn missing_plugin_function_fails_at_apply_time() {
    let schema = schema_with("frame_size: 1;", "x: u8 @ 0 { func: not_registered; }");
    // No frames, no lookup.
    assert!(run_to_vec(&schema, &FunctionTable::new(), &[]).expect("run").is_empty());

    let mut sink: Vec<Record> = Vec::new();
    let err = RecordPipeline::new(&schema, &NoPlugin)
        .run(Cursor::new([4u8]), 1, &mut sink)
        .unwrap_err();
    match err {
        Error::Calibration { source, .. } => assert_eq!(
            source,
            CalibrationError::Plugin(PluginError::MissingFunction("not_registered".to_string()))
        ),
        other => panic!("unexpected {}", other),
    }
}

#[test]
fn plugin_runtime_failure() {
    let schema = schema_with("frame_size: 1;", "x: u8 @ 0 { func: picky; }");
    let mut plugin = FunctionTable::new();
    plugin.register("picky", |raw| {
        if raw > 100.0 {
            Err(format!("{} is out of range", raw))
        } else {
            Ok(raw * 10.0)
        }
    });
    let records = run_to_vec(&schema, &plugin, &[5]).expect("run");
    assert_eq!(records[0].values, vec![Value::F64(50.0)]);

    match run_to_vec(&schema, &plugin, &[200]) {
        Err(Error::Calibration {
            source: CalibrationError::Plugin(PluginError::RuntimeFailure { function, reason }),
            ..
        }) => {
            assert_eq!(function, "picky");
            assert!(reason.contains("out of range"));
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn plugin_file_functions() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("extra.plugin");
    std::fs::write(
        &path,
        "// thermistor\nkelvin_to_celsius = raw - 273.15;\nhalf = raw // 2;\n",
    )
    .expect("write");

    let mut plugin = FunctionTable::with_builtins();
    assert_eq!(plugin.load_file(&path).expect("load"), 2);
    assert!(plugin.contains("obt_seconds_to_unix"));

    let schema = schema_with(
        "frame_size: 4; endian: big;",
        "k: u16 @ 0 { func: kelvin_to_celsius; round: 2; } h: u16 @ 2 { func: half; }",
    );
    let records = run_to_vec(&schema, &plugin, &[0x01, 0x2C, 0x00, 0x07]).expect("run");
    assert_eq!(records[0].values, vec![Value::F64(26.85), Value::F64(3.0)]);
}

// ==================== Modes ====================

#[test]
fn sort_by_keeps_frame_index() {
    let schema = schema_with(
        "frame_size: 1; read_in_memory: true; sort_by: S.x; include_frame_index: true;",
        "x: u8 @ 0;",
    );
    let records = run_to_vec(&schema, &FunctionTable::new(), &[3, 1, 2]).expect("run");
    let rows: Vec<_> = records
        .iter()
        .map(|r| (r.frame_index, r.values[0].clone()))
        .collect();
    assert_eq!(
        rows,
        vec![
            (Some(1), Value::U8(1)),
            (Some(2), Value::U8(2)),
            (Some(0), Value::U8(3)),
        ]
    );
}

#[test]
fn sort_is_stable() {
    let schema = schema_with(
        "frame_size: 2; read_in_memory: true; sort_by: S.key; include_frame_index: true;",
        "key: u8 @ 0; tag: u8 @ 1;",
    );
    let data = [2, 0, 1, 1, 2, 2, 1, 3];
    let records = run_to_vec(&schema, &FunctionTable::new(), &data).expect("run");
    let order: Vec<_> = records.iter().map(|r| r.frame_index).collect();
    assert_eq!(order, vec![Some(1), Some(3), Some(0), Some(2)]);
}

#[test]
fn sort_by_calibrated_value() {
    let schema = schema_with(
        "frame_size: 1; read_in_memory: true; sort_by: S.x;",
        r#"x: i8 @ 0 { expr: "-raw"; }"#,
    );
    let records = run_to_vec(&schema, &FunctionTable::new(), &[1, 3, 2]).expect("run");
    let values: Vec<_> = records.iter().map(|r| r.values[0].clone()).collect();
    assert_eq!(values, vec![Value::F64(-3.0), Value::F64(-2.0), Value::F64(-1.0)]);
}

#[test]
fn streaming_and_buffered_agree() {
    let fields = r#"a: u16 @ 0; b: i16 @ 2 { expr: "raw * 3 + 1"; } c: u8 @ 4;"#;
    let streaming = schema_with("frame_size: 5; include_frame_index: true;", fields);
    let buffered = schema_with(
        "frame_size: 5; include_frame_index: true; read_in_memory: true;",
        fields,
    );
    let data: Vec<u8> = (0u8..50).collect();
    let plugin = FunctionTable::new();
    let a = run_to_vec(&streaming, &plugin, &data).expect("streaming");
    let b = run_to_vec(&buffered, &plugin, &data).expect("buffered");
    assert_eq!(a.len(), 10);
    assert_eq!(a, b);
}

#[test]
fn stream_yields_records_lazily() {
    let schema = schema_with("frame_size: 2; endian: big;", "x: u16 @ 0;");
    let plugin = FunctionTable::new();
    let pipeline = RecordPipeline::new(&schema, &plugin);
    let data = [0, 1, 0, 2, 0, 3];
    let reader = FrameReader::new(Cursor::new(data), 6, 2).expect("reader");
    assert_eq!(reader.frame_count(), 3);
    let first = pipeline.stream(reader).next().expect("record").expect("ok");
    assert_eq!(first.values, vec![Value::U16(1)]);
}

#[test]
fn collect_matches_run() {
    let schema = schema_with("frame_size: 1; read_in_memory: true;", "x: u8 @ 0;");
    let plugin = FunctionTable::new();
    let records = RecordPipeline::new(&schema, &plugin).collect(&[4, 5]).expect("collect");
    assert_eq!(records, run_to_vec(&schema, &plugin, &[4, 5]).expect("run"));
}

// ==================== Input errors ====================

#[test]
fn misaligned_input_is_rejected_before_any_record() {
    let schema = schema_with("frame_size: 2;", "x: u8 @ 0;");
    let mut sink: Vec<Record> = Vec::new();
    let err = RecordPipeline::new(&schema, &NoPlugin)
        .run(Cursor::new([1u8, 2, 3, 4, 5]), 5, &mut sink)
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Input(InputError::NotFrameAligned { len: 5, frame_size: 2 })
    ));
    assert!(sink.is_empty());

    let buffered = schema_with("frame_size: 2; read_in_memory: true;", "x: u8 @ 0;");
    assert!(matches!(
        RecordPipeline::new(&buffered, &NoPlugin).collect(&[1, 2, 3]),
        Err(Error::Input(InputError::NotFrameAligned { .. }))
    ));
}

#[test]
fn short_read_is_reported() {
    let schema = schema_with("frame_size: 2;", "x: u8 @ 0;");
    let mut sink: Vec<Record> = Vec::new();
    // Declared length 4, only 3 bytes available.
    let err = RecordPipeline::new(&schema, &NoPlugin)
        .run(Cursor::new([1u8, 2, 3]), 4, &mut sink)
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Input(InputError::Truncated {
            frame_index: 1,
            read: 1,
            expected: 2
        })
    ));
    assert_eq!(sink.len(), 1);
}

#[test]
fn bytes_past_declared_length_are_ignored() {
    let data = [1u8, 2, 3, 4, 5, 6];
    for settings in ["frame_size: 2;", "frame_size: 2; read_in_memory: true;"] {
        let schema = schema_with(settings, "x: u8 @ 0;");
        let mut sink: Vec<Record> = Vec::new();
        let written = RecordPipeline::new(&schema, &NoPlugin)
            .run(Cursor::new(data), 4, &mut sink)
            .expect("run");
        assert_eq!(written, 2, "{}", settings);
        let values: Vec<_> = sink.iter().map(|r| r.values[0].clone()).collect();
        assert_eq!(values, vec![Value::U8(1), Value::U8(3)]);
    }
}

#[test]
fn in_memory_short_read_is_reported_without_preallocating() {
    let schema = schema_with("frame_size: 2; read_in_memory: true;", "x: u8 @ 0;");
    let mut sink: Vec<Record> = Vec::new();
    // A declared length far beyond what the reader holds.
    let err = RecordPipeline::new(&schema, &NoPlugin)
        .run(Cursor::new([1u8, 2, 3, 4]), 2 << 40, &mut sink)
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Input(InputError::Truncated {
            frame_index: 2,
            read: 0,
            expected: 2
        })
    ));
    assert!(sink.is_empty());

    let err = RecordPipeline::new(&schema, &NoPlugin)
        .run(Cursor::new([1u8, 2, 3]), 4, &mut sink)
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Input(InputError::Truncated {
            frame_index: 1,
            read: 1,
            expected: 2
        })
    ));
}

// ==================== CSV output ====================

#[test]
fn csv_file_end_to_end() {
    let dir = tempfile::tempdir().expect("tempdir");
    let input = dir.path().join("dump.bin");
    let output = dir.path().join("out.csv");
    std::fs::write(
        &input,
        frames(&[
            [2, 0x01, 0xF4, 0xFE, 0, 0, 0, 10],
            [3, 0x02, 0x58, 0x05, 0, 0, 0, 20],
        ]),
    )
    .expect("write input");

    let schema = Schema::from_source(HOUSEKEEPING).expect("schema");
    let plugin = FunctionTable::with_builtins();
    let mut sink = DelimitedWriter::create(&output, ';').expect("create");
    let written = RecordPipeline::new(&schema, &plugin)
        .run_path(&input, &mut sink)
        .expect("run");
    assert_eq!(written, 2);
    drop(sink);

    let text = std::fs::read_to_string(&output).expect("read output");
    assert_eq!(
        text,
        "PCS.mode;PCS.vBat;PCS.temp;CDH.OBT\n\
         2;4;-2;315964810\n\
         3;5;5;315964820\n"
    );
}

#[test]
fn empty_input_writes_header_only() {
    let schema = schema_with("frame_size: 4; include_frame_index: true;", "x: u32 @ 0;");
    let mut sink = DelimitedWriter::new(Vec::new(), ',');
    let written = RecordPipeline::new(&schema, &NoPlugin)
        .run(Cursor::new(Vec::<u8>::new()), 0, &mut sink)
        .expect("run");
    assert_eq!(written, 0);
    assert_eq!(String::from_utf8(sink.into_inner()).unwrap(), "frame_index,S.x\n");
}
