//! Config files feeding the sink

use std::io::Write;

use binviz::{BinvizConfig, BinvizError, Pipeline, VectorSource, VizSink};

fn write_config(text: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(text.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

#[test]
fn test_config_file_drives_sink() {
    let file = write_config(
        r#"
        [sink]
        width = 8
        height = 2
        end_pattern = "11"
        flush_on_close = true

        [runtime]
        buffer_size = 4
        "#,
    );
    let config = BinvizConfig::from_file(file.path()).unwrap();
    config.validate().unwrap();

    let sink = VizSink::from_config(&config.sink).unwrap();
    let raster = sink.raster();

    let mut pipeline = Pipeline::new()
        .with_default_buffer_size(config.runtime.buffer_size)
        .with_watchdog_threshold(config.runtime.watchdog_threshold());
    pipeline.add_process("src", VectorSource::new(vec![0x30])).unwrap();
    pipeline.add_process("dst", sink).unwrap();
    pipeline.connect("src", "out", "dst", "in").unwrap();
    assert!(pipeline.run().unwrap().is_success());

    // "0011" then a line break; the held-back 0 is flushed at end of stream
    assert_eq!(raster.lock().unwrap().render_text(), "..##    \n....    \n");
}

#[test]
fn test_missing_file_is_io_error() {
    let err = BinvizConfig::from_file("/no/such/binviz.toml").unwrap_err();
    assert!(matches!(err, BinvizError::Io(_)));
}

#[test]
fn test_malformed_file_is_parse_error() {
    let file = write_config("[sink\nwidth = 8\n");
    let err = BinvizConfig::from_file(file.path()).unwrap_err();
    assert!(matches!(err, BinvizError::ConfigParse(_)));
}

#[test]
fn test_invalid_pattern_in_file_fails_validation() {
    let file = write_config("[sink]\nstart_pattern = \"1012\"\n");
    let config = BinvizConfig::from_file(file.path()).unwrap();
    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("1012"));
    assert!(VizSink::from_config(&config.sink).is_err());
}
