use ndarray::{array, Array1};
use nsbas_xval::io::stack::{LineSink, LineSource};
use nsbas_xval::io::InMemoryStack;
use nsbas_xval::{
    NetworkInputs, NsbasError, ProcessingParams, WeightSource, XvalPipeline,
};
use std::io::Write;
use tempfile::NamedTempFile;

fn network() -> NetworkInputs {
    NetworkInputs {
        jmat: array![
            [-1.0, 1.0, 0.0, 0.0, 0.0],
            [0.0, -1.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, -1.0, 1.0, 0.0],
            [0.0, 0.0, 0.0, -1.0, 1.0],
            [-1.0, 0.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, -1.0, 0.0, 1.0],
        ],
        dates: ["20100101", "20100401", "20100701", "20101001", "20110101"]
            .iter()
            .map(|d| d.to_string())
            .collect(),
        bperp: Array1::zeros(6),
    }
}

fn weight_file(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("Failed to create temp file");
    write!(file, "{}", contents).expect("Failed to write weight file");
    file
}

#[test]
fn test_partial_weight_file_aborts_before_processing() {
    let _ = env_logger::builder().is_test(true).try_init();

    // Only three of the five acquisition dates have a weight
    let file = weight_file("20100101 0.2\n20100401 0.3\n20100701 0.5\n");
    let result = XvalPipeline::new(
        &ProcessingParams::default(),
        &network(),
        &WeightSource::Table(file.path().to_path_buf()),
    );

    match result {
        Err(NsbasError::Config(message)) => {
            println!("Configuration rejected: {}", message);
            assert!(message.contains("20101001"));
        }
        Err(other) => panic!("expected a configuration error, got {}", other),
        Ok(_) => panic!("a partial weight file must abort the run"),
    }
}

#[test]
fn test_full_weight_file_runs() {
    let file = weight_file("# epoch weights\n20110101 0.1\n20101001 0.2\n20100701 0.3\n20100401 0.2\n20100101 0.2\n");
    let pipeline = XvalPipeline::new(
        &ProcessingParams::default(),
        &network(),
        &WeightSource::Table(file.path().to_path_buf()),
    )
    .expect("Complete weight file should be accepted");

    let mut stack = InMemoryStack::new(ndarray::Array3::from_elem((6, 1, 2), 0.5f32));
    let (products, summary) = pipeline
        .run_to_products(&mut stack)
        .expect("Run should succeed");
    assert_eq!(summary.lines, 1);
    assert_eq!(products.ifgcnt[[0, 0]], 6);
}

#[test]
fn test_missing_weight_file_is_io_error() {
    let result = XvalPipeline::new(
        &ProcessingParams::default(),
        &network(),
        &WeightSource::Table("/nonexistent/weights.txt".into()),
    );
    assert!(matches!(result, Err(NsbasError::Io(_))));
}

/// Sink that records every line it receives
struct RecordingSink {
    lines: Vec<usize>,
}

impl LineSink for RecordingSink {
    fn write_line(
        &mut self,
        line: usize,
        _buffers: &nsbas_xval::core::LineBuffers,
    ) -> nsbas_xval::NsbasResult<()> {
        self.lines.push(line);
        Ok(())
    }
}

#[test]
fn test_lines_are_written_in_scan_order() {
    let pipeline = XvalPipeline::new(
        &ProcessingParams::default(),
        &network(),
        &WeightSource::Uniform,
    )
    .expect("Uniform weights should be accepted");

    let mut stack = InMemoryStack::new(ndarray::Array3::from_elem((6, 4, 3), 0.25f32));
    assert_eq!(stack.dims(), (6, 4, 3));
    let mut sink = RecordingSink { lines: Vec::new() };
    pipeline.run(&mut stack, &mut sink).expect("Run should succeed");
    assert_eq!(sink.lines, vec![0, 1, 2, 3]);
}
