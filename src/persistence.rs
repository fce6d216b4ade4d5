//! ASCII sampling files.
//!
//! Layout (one item per line, whitespace-separated):
//!
//! ```text
//! <vector_count>
//! <neighbor_count>                       repeated per vector
//! <neighbor indices>
//! [<neighbor psi, degrees>]              only with track_psi
//! <neighbor dot products>
//! <rot> <tilt> <psi>                     per vector, degrees, only with write_vectors
//! <x> <y> <z>
//! ```
//!
//! A vector without neighbors still gets its (empty) list lines. Whether the
//! psi lines and the vector block are present is not recorded in the file;
//! writer and reader must be given the same [`FormatOptions`].

use std::io::{BufRead, Lines, Write};
use std::str::FromStr;

use tracing::debug;

use crate::error::{Result, SamplingError};
use crate::geometry::{EulerAngles, SpherePoint};
use crate::neighbors::{Neighbor, NeighborList};
use crate::reduce::ReducedGrid;
use crate::Vector3;

/// Vectors read back must have unit norm within this tolerance.
const UNIT_NORM_TOL: f64 = 1e-6;

/// Optional sections of a sampling file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatOptions {
    /// Write/read one psi line per neighbor list.
    pub track_psi: bool,
    /// Append the per-point angles and vectors.
    pub write_vectors: bool,
}

impl Default for FormatOptions {
    fn default() -> Self {
        Self {
            track_psi: false,
            write_vectors: true,
        }
    }
}

/// Contents of a sampling file.
#[derive(Debug, Clone, PartialEq)]
pub struct SamplingFile {
    /// Neighbor lists. The radius is not stored in the file and reads back
    /// as 0.
    pub neighbors: NeighborList,
    /// Sampling points, present when written with `write_vectors`.
    pub points: Option<Vec<SpherePoint>>,
}

impl SamplingFile {
    pub fn num_vectors(&self) -> usize {
        self.neighbors.len()
    }
}

fn write_row<W: Write, T: std::fmt::Display>(
    writer: &mut W,
    values: impl Iterator<Item = T>,
) -> Result<()> {
    let mut first = true;
    for v in values {
        if !first {
            write!(writer, " ")?;
        }
        write!(writer, "{v}")?;
        first = false;
    }
    writeln!(writer)?;
    Ok(())
}

/// Write `grid` and its neighbor lists.
pub fn save_sampling_file<W: Write>(
    mut writer: W,
    grid: &ReducedGrid,
    neighbors: &NeighborList,
    options: FormatOptions,
) -> Result<()> {
    if neighbors.len() != grid.len() {
        return Err(SamplingError::InvalidInput(format!(
            "neighbor lists cover {} points but the grid has {}",
            neighbors.len(),
            grid.len()
        )));
    }

    writeln!(writer, "{}", grid.len())?;
    for list in &neighbors.lists {
        writeln!(writer, "{}", list.len())?;
        write_row(&mut writer, list.iter().map(|n| n.index))?;
        if options.track_psi {
            write_row(&mut writer, list.iter().map(|n| n.psi.to_degrees()))?;
        }
        write_row(&mut writer, list.iter().map(|n| n.dot))?;
    }

    if options.write_vectors {
        for p in grid.points() {
            write_row(&mut writer, p.angles.to_degrees().into_iter())?;
            write_row(&mut writer, p.vector.into_iter())?;
        }
    }
    writer.flush()?;
    debug!(
        "Wrote sampling file: {} vectors, {} neighbor entries",
        grid.len(),
        neighbors.num_edges()
    );
    Ok(())
}

/// Line source that remembers the 1-based number of the last line read.
struct LineCursor<R> {
    lines: Lines<R>,
    line: usize,
}

impl<R: BufRead> LineCursor<R> {
    fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            line: 0,
        }
    }

    fn next(&mut self, expected: &str) -> Result<String> {
        match self.lines.next() {
            Some(line) => {
                self.line += 1;
                Ok(line?)
            }
            None => Err(SamplingError::parse(
                self.line + 1,
                format!("unexpected end of file, expected {expected}"),
            )),
        }
    }

    fn values<T: FromStr>(&mut self, expected: &str, count: usize) -> Result<Vec<T>> {
        let text = self.next(expected)?;
        let values = text
            .split_whitespace()
            .map(|tok| {
                tok.parse::<T>().map_err(|_| {
                    SamplingError::parse(self.line, format!("cannot parse `{tok}` in {expected}"))
                })
            })
            .collect::<Result<Vec<T>>>()?;
        if values.len() != count {
            return Err(SamplingError::parse(
                self.line,
                format!("expected {count} values in {expected}, found {}", values.len()),
            ));
        }
        Ok(values)
    }

    fn count(&mut self, expected: &str) -> Result<usize> {
        Ok(self.values::<usize>(expected, 1)?[0])
    }
}

/// Read a file produced by [`save_sampling_file`] with the same options.
pub fn read_sampling_file<R: BufRead>(reader: R, options: FormatOptions) -> Result<SamplingFile> {
    let mut cursor = LineCursor::new(reader);
    let num_vectors = cursor.count("vector count")?;

    // The count is untrusted; lists grow as lines are actually read.
    let mut lists = Vec::new();
    for i in 0..num_vectors {
        let n = cursor.count(&format!("neighbor count of vector {i}"))?;
        let indices: Vec<u32> = cursor.values(&format!("neighbor indices of vector {i}"), n)?;
        if let Some(bad) = indices.iter().find(|&&j| j as usize >= num_vectors) {
            return Err(SamplingError::parse(
                cursor.line,
                format!("neighbor index {bad} out of range for {num_vectors} vectors"),
            ));
        }
        let psi: Vec<f64> = if options.track_psi {
            cursor.values(&format!("neighbor psi of vector {i}"), n)?
        } else {
            vec![0.0; n]
        };
        let dots: Vec<f64> = cursor.values(&format!("neighbor dot products of vector {i}"), n)?;
        lists.push(
            indices
                .into_iter()
                .zip(psi)
                .zip(dots)
                .map(|((index, psi_deg), dot)| Neighbor {
                    index,
                    dot,
                    psi: psi_deg.to_radians(),
                })
                .collect(),
        );
    }

    let points = if options.write_vectors {
        let mut points = Vec::new();
        for i in 0..num_vectors {
            let a: Vec<f64> = cursor.values(&format!("angles of vector {i}"), 3)?;
            let v: Vec<f64> = cursor.values(&format!("components of vector {i}"), 3)?;
            let norm = Vector3::new(v[0], v[1], v[2]).norm();
            if !((norm - 1.0).abs() <= UNIT_NORM_TOL) {
                return Err(SamplingError::parse(
                    cursor.line,
                    format!("vector {i} is not unit length (norm {norm})"),
                ));
            }
            points.push(SpherePoint {
                vector: [v[0], v[1], v[2]],
                angles: EulerAngles::from_degrees(a[0], a[1], a[2]),
            });
        }
        Some(points)
    } else {
        None
    };

    let neighbors = NeighborList {
        radius_rad: 0.0,
        track_psi: options.track_psi,
        lists,
    };
    debug!(
        "Read sampling file: {} vectors, {} neighbor entries",
        num_vectors,
        neighbors.num_edges()
    );
    Ok(SamplingFile { neighbors, points })
}

/// List the points of the asymmetric unit: `index rot tilt x y z`, angles in
/// degrees.
pub fn write_asym_unit<W: Write>(mut writer: W, grid: &ReducedGrid) -> Result<()> {
    for (i, p) in grid.points().enumerate() {
        let [rot, tilt, _] = p.angles.to_degrees();
        writeln!(
            writer,
            "{} {} {} {} {} {}",
            i, rot, tilt, p.vector[0], p.vector[1], p.vector[2]
        )?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;
    use std::io::Cursor;

    use crate::grid::generate;
    use crate::neighbors::build_neighbors;

    fn small_grid() -> ReducedGrid {
        ReducedGrid::identity(generate(30f64.to_radians(), (0.0, PI), true).unwrap())
    }

    fn roundtrip(options: FormatOptions) -> (ReducedGrid, NeighborList, SamplingFile) {
        let grid = small_grid();
        let mut neighbors = build_neighbors(&grid, 40f64.to_radians(), false).unwrap();
        if options.track_psi {
            for (i, list) in neighbors.lists.iter_mut().enumerate() {
                for n in list.iter_mut() {
                    n.psi = (i as f64 * 7.0 - n.index as f64).to_radians();
                }
            }
        }
        let mut buf = Vec::new();
        save_sampling_file(&mut buf, &grid, &neighbors, options).unwrap();
        let file = read_sampling_file(Cursor::new(buf), options).unwrap();
        (grid, neighbors, file)
    }

    #[test]
    fn test_roundtrip_with_vectors() {
        let (grid, neighbors, file) = roundtrip(FormatOptions::default());
        assert_eq!(file.num_vectors(), grid.len());
        for (a, b) in file.neighbors.lists.iter().zip(&neighbors.lists) {
            assert_eq!(a.len(), b.len());
            for (x, y) in a.iter().zip(b) {
                assert_eq!(x.index, y.index);
                assert_eq!(x.dot, y.dot);
            }
        }
        let points = file.points.unwrap();
        for (p, q) in points.iter().zip(grid.points()) {
            assert_eq!(p.vector, q.vector);
            assert!((p.angles.direction() - q.uvec()).norm() < 1e-9);
        }
    }

    #[test]
    fn test_roundtrip_with_psi() {
        let options = FormatOptions {
            track_psi: true,
            write_vectors: false,
        };
        let (_, neighbors, file) = roundtrip(options);
        assert!(file.points.is_none());
        for (a, b) in file.neighbors.lists.iter().zip(&neighbors.lists) {
            for (x, y) in a.iter().zip(b) {
                assert!((x.psi - y.psi).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn test_empty_neighbor_list_lines() {
        let grid = small_grid();
        let neighbors = build_neighbors(&grid, 1f64.to_radians(), false).unwrap();
        assert_eq!(neighbors.num_edges(), 0);
        let options = FormatOptions {
            track_psi: false,
            write_vectors: false,
        };
        let mut buf = Vec::new();
        save_sampling_file(&mut buf, &grid, &neighbors, options).unwrap();
        let text = String::from_utf8(buf.clone()).unwrap();
        assert_eq!(text.lines().count(), 1 + 3 * grid.len());
        let file = read_sampling_file(Cursor::new(buf), options).unwrap();
        assert_eq!(file.neighbors.lists, neighbors.lists);
    }

    #[test]
    fn test_parse_errors_report_line() {
        let options = FormatOptions {
            track_psi: false,
            write_vectors: false,
        };
        let cases = [
            ("2\n1\n1\n0.9\n1\n5\n0.9\n", 6),
            ("2\n1\n1\n0.9\nx\n", 5),
            ("2\n2\n1\n0.9 0.8\n", 3),
            ("2\n1\n1\n0.9\n", 5),
            ("two\n", 1),
            ("18446744073709551615\n", 2),
            ("-3\n", 1),
        ];
        for (text, line) in cases {
            match read_sampling_file(Cursor::new(text), options) {
                Err(SamplingError::Parse { line: l, .. }) => assert_eq!(l, line, "{text:?}"),
                other => panic!("expected parse error for {text:?}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_non_unit_vector_rejected() {
        let options = FormatOptions::default();
        let text = "1\n0\n\n\n0 0 0\n0 0 2\n";
        match read_sampling_file(Cursor::new(text), options) {
            Err(SamplingError::Parse { line, .. }) => assert_eq!(line, 6),
            other => panic!("expected parse error, got {other:?}"),
        }
        let ok = "1\n0\n\n\n0 0 0\n0 0 1\n";
        let file = read_sampling_file(Cursor::new(ok), options).unwrap();
        assert_eq!(file.points.unwrap().len(), 1);
    }

    #[test]
    fn test_asym_unit_listing() {
        let grid = small_grid();
        let mut buf = Vec::new();
        write_asym_unit(&mut buf, &grid).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(text.lines().count(), grid.len());
        let first: Vec<f64> = text
            .lines()
            .next()
            .unwrap()
            .split_whitespace()
            .map(|t| t.parse().unwrap())
            .collect();
        assert_eq!(first, vec![0.0, 0.0, 0.0, 0.0, 0.0, 1.0]);
    }
}
