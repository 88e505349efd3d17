//! Extended XYZ reading and writing.
//!
//! Only the subset needed for periodic structures is handled:
//!
//! ```text
//! 3
//! Lattice="ax ay az bx by bz cx cy cz" Properties=species:S:1:pos:R:3:initial_magmoms:R:1 energy=-1.2345 pbc="T T F"
//! Mo  0.00000000  0.00000000  3.07000000  0.00000000
//! S   1.59500000  0.92100000  1.50000000  0.00000000
//! Li  2.00000000  1.00000000  8.61000000  1.00000000
//! ```
//!
//! Columns other than species, positions and initial magnetic moments are
//! skipped on read.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use nalgebra::Vector3;

use crate::schema::{Atom, Lattice, Structure, elements};

/// Errors reading or writing extended XYZ.
#[derive(Debug, thiserror::Error)]
pub enum XyzError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Unexpected end of file")]
    UnexpectedEof,
    #[error("Line {line}: invalid atom count `{content}`")]
    InvalidCount { line: usize, content: String },
    #[error("Line {line}: comment line has no Lattice")]
    MissingLattice { line: usize },
    #[error("Line {line}: invalid {key} `{value}`")]
    InvalidField {
        line: usize,
        key: &'static str,
        value: String,
    },
    #[error("Line {line}: invalid atom line `{content}`")]
    InvalidAtom { line: usize, content: String },
    #[error("Line {line}: unknown element `{symbol}`")]
    UnknownElement { line: usize, symbol: String },
}

/// Column layout declared by the `Properties` key.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Columns {
    species: usize,
    pos: usize,
    magmom: Option<usize>,
}

impl Default for Columns {
    fn default() -> Self {
        Self {
            species: 0,
            pos: 1,
            magmom: None,
        }
    }
}

fn parse_properties(value: &str) -> Option<Columns> {
    let fields: Vec<&str> = value.split(':').collect();
    if fields.len() % 3 != 0 {
        return None;
    }

    let mut species = None;
    let mut pos = None;
    let mut magmom = None;
    let mut column = 0;
    for chunk in fields.chunks(3) {
        let count: usize = chunk[2].parse().ok()?;
        match (chunk[0].to_ascii_lowercase().as_str(), count) {
            ("species", 1) => species = Some(column),
            ("pos", 3) => pos = Some(column),
            ("initial_magmoms" | "magmoms", 1) => magmom = Some(column),
            _ => {}
        }
        column += count;
    }

    Some(Columns {
        species: species?,
        pos: pos?,
        magmom,
    })
}

/// Split a comment line into lowercase keys and unquoted values.
fn parse_comment(line: &str) -> BTreeMap<String, String> {
    let mut fields = BTreeMap::new();
    let mut chars = line.chars().peekable();

    loop {
        while chars.next_if(|c| c.is_whitespace()).is_some() {}
        let mut key = String::new();
        while let Some(c) = chars.next_if(|c| !c.is_whitespace() && *c != '=') {
            key.push(c);
        }
        if key.is_empty() {
            if chars.next().is_none() {
                break;
            }
            continue;
        }

        let mut value = String::new();
        if chars.next_if_eq(&'=').is_some() {
            if chars.next_if_eq(&'"').is_some() {
                for c in chars.by_ref() {
                    if c == '"' {
                        break;
                    }
                    value.push(c);
                }
            } else {
                while let Some(c) = chars.next_if(|c| !c.is_whitespace()) {
                    value.push(c);
                }
            }
        }
        fields.insert(key.to_ascii_lowercase(), value);
    }

    fields
}

fn parse_floats(value: &str) -> Option<Vec<f64>> {
    value.split_whitespace().map(|v| v.parse().ok()).collect()
}

fn parse_flag(token: &str) -> Option<bool> {
    match token {
        "T" | "t" | "True" | "true" | "1" => Some(true),
        "F" | "f" | "False" | "false" | "0" => Some(false),
        _ => None,
    }
}

fn parse_species(token: &str) -> Option<u8> {
    elements::atomic_number(token).or_else(|| token.parse().ok())
}

/// Line-counting reader shared by the frame parser.
struct Lines<R> {
    inner: io::Lines<R>,
    number: usize,
}

impl<R: BufRead> Lines<R> {
    fn next_line(&mut self) -> Result<Option<String>, XyzError> {
        match self.inner.next() {
            Some(line) => {
                self.number += 1;
                Ok(Some(line?))
            }
            None => Ok(None),
        }
    }

    fn require(&mut self) -> Result<String, XyzError> {
        self.next_line()?.ok_or(XyzError::UnexpectedEof)
    }
}

fn read_frame<R: BufRead>(lines: &mut Lines<R>) -> Result<Option<Structure>, XyzError> {
    let header = loop {
        match lines.next_line()? {
            Some(line) if line.trim().is_empty() => continue,
            Some(line) => break line,
            None => return Ok(None),
        }
    };
    let count: usize = header
        .trim()
        .parse()
        .map_err(|_| XyzError::InvalidCount {
            line: lines.number,
            content: header.clone(),
        })?;

    let comment = lines.require()?;
    let comment_line = lines.number;
    let fields = parse_comment(&comment);

    let lattice_value = fields
        .get("lattice")
        .ok_or(XyzError::MissingLattice { line: comment_line })?;
    let invalid = |key: &'static str, value: &str| XyzError::InvalidField {
        line: comment_line,
        key,
        value: value.to_string(),
    };

    let lattice = match parse_floats(lattice_value).as_deref() {
        Some(&[ax, ay, az, bx, by, bz, cx, cy, cz]) => Lattice::new(
            Vector3::new(ax, ay, az),
            Vector3::new(bx, by, bz),
            Vector3::new(cx, cy, cz),
        ),
        _ => return Err(invalid("Lattice", lattice_value)),
    };

    let columns = match fields.get("properties") {
        Some(value) => parse_properties(value).ok_or_else(|| invalid("Properties", value))?,
        None => Columns::default(),
    };

    let energy = match fields.get("energy") {
        Some(value) => Some(value.parse().map_err(|_| invalid("energy", value))?),
        None => None,
    };

    let pbc = match fields.get("pbc") {
        Some(value) => {
            let flags: Option<Vec<bool>> = value.split_whitespace().map(parse_flag).collect();
            match flags.as_deref() {
                Some(&[a, b, c]) => [a, b, c],
                _ => return Err(invalid("pbc", value)),
            }
        }
        None => [true, true, true],
    };

    let mut structure = Structure::new(lattice);
    structure.pbc = pbc;
    structure.energy = energy;

    for _ in 0..count {
        let line = lines.require()?;
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let bad_atom = || XyzError::InvalidAtom {
            line: lines.number,
            content: line.clone(),
        };

        let symbol = *tokens.get(columns.species).ok_or_else(bad_atom)?;
        let number = parse_species(symbol).ok_or_else(|| XyzError::UnknownElement {
            line: lines.number,
            symbol: symbol.to_string(),
        })?;
        let coords: Option<Vec<f64>> = tokens
            .get(columns.pos..columns.pos + 3)
            .and_then(|xyz| xyz.iter().map(|v| v.parse().ok()).collect());
        let coords = coords.ok_or_else(bad_atom)?;

        let mut atom = Atom::new(number, Vector3::new(coords[0], coords[1], coords[2]));
        if let Some(column) = columns.magmom {
            let value = tokens.get(column).and_then(|v| v.parse().ok());
            atom.magmom = Some(value.ok_or_else(bad_atom)?);
        }
        structure.push(atom);
    }

    Ok(Some(structure))
}

/// Read every frame from an extended XYZ stream.
pub fn read_xyz_frames<R: BufRead>(reader: R) -> Result<Vec<Structure>, XyzError> {
    let mut lines = Lines {
        inner: reader.lines(),
        number: 0,
    };
    let mut frames = Vec::new();
    while let Some(frame) = read_frame(&mut lines)? {
        frames.push(frame);
    }
    Ok(frames)
}

/// Read the first frame from an extended XYZ stream.
pub fn read_xyz<R: BufRead>(reader: R) -> Result<Structure, XyzError> {
    let mut lines = Lines {
        inner: reader.lines(),
        number: 0,
    };
    read_frame(&mut lines)?.ok_or(XyzError::UnexpectedEof)
}

/// Read the first frame of an extended XYZ file.
pub fn read_xyz_file<P: AsRef<Path>>(path: P) -> Result<Structure, XyzError> {
    read_xyz(BufReader::new(File::open(path)?))
}

/// Write one frame.
pub fn write_xyz<W: Write>(writer: &mut W, structure: &Structure) -> Result<(), XyzError> {
    let with_magmoms = structure.atoms.iter().any(|a| a.magmom.is_some());
    let [a, b, c] = structure.lattice.vectors;
    let flag = |v: bool| if v { "T" } else { "F" };

    writeln!(writer, "{}", structure.len())?;
    write!(
        writer,
        "Lattice=\"{:.8} {:.8} {:.8} {:.8} {:.8} {:.8} {:.8} {:.8} {:.8}\" ",
        a.x, a.y, a.z, b.x, b.y, b.z, c.x, c.y, c.z
    )?;
    if with_magmoms {
        write!(writer, "Properties=species:S:1:pos:R:3:initial_magmoms:R:1")?;
    } else {
        write!(writer, "Properties=species:S:1:pos:R:3")?;
    }
    if let Some(energy) = structure.energy {
        write!(writer, " energy={energy}")?;
    }
    writeln!(
        writer,
        " pbc=\"{} {} {}\"",
        flag(structure.pbc[0]),
        flag(structure.pbc[1]),
        flag(structure.pbc[2])
    )?;

    for atom in &structure.atoms {
        let p = atom.position;
        write!(
            writer,
            "{:<2} {:>15.8} {:>15.8} {:>15.8}",
            atom.symbol, p.x, p.y, p.z
        )?;
        if with_magmoms {
            write!(writer, " {:>11.8}", atom.magmom.unwrap_or(0.0))?;
        }
        writeln!(writer)?;
    }
    Ok(())
}

/// Write one frame to `path`, replacing any existing file.
pub fn write_xyz_file<P: AsRef<Path>>(path: P, structure: &Structure) -> Result<(), XyzError> {
    let mut writer = BufWriter::new(File::create(path)?);
    write_xyz(&mut writer, structure)?;
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tempfile::tempdir;

    fn sample() -> Structure {
        let mut s = Structure::with_atoms(
            Lattice::hexagonal(3.19, 17.22),
            vec![
                Atom::from_symbol("Mo", Vector3::new(0.0, 0.0, 3.07)).unwrap(),
                Atom::from_symbol("Li", Vector3::new(1.0, 0.5, 8.61)).unwrap(),
            ],
        );
        s.set_initial_magmoms(1, 1.5);
        s.energy = Some(-12.3456);
        s.pbc = [true, true, false];
        s
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sample.xyz");
        let original = sample();
        write_xyz_file(&path, &original).unwrap();

        let loaded = read_xyz_file(&path).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.energy, Some(-12.3456));
        assert_eq!(loaded.pbc, [true, true, false]);
        assert_eq!(loaded.initial_magmoms(), vec![0.0, 1.5]);
        assert_eq!(loaded.atoms[1].symbol, "Li");
        assert!((loaded.atoms[1].position - original.atoms[1].position).norm() < 1e-7);
        for (x, y) in loaded
            .lattice
            .vectors
            .iter()
            .zip(original.lattice.vectors.iter())
        {
            assert!((x - y).norm() < 1e-7);
        }
    }

    #[test]
    fn test_read_foreign_columns() {
        let text = "2\n\
            Properties=species:S:1:pos:R:3:forces:R:3 Lattice=\"3 0 0 0 3 0 0 0 10\" energy=-1.5 pbc=\"T T T\"\n\
            C 0 0 1 0.1 0.2 0.3\n\
            O 1 1 2 0.1 0.2 0.3\n";
        let s = read_xyz(Cursor::new(text)).unwrap();
        assert_eq!(s.len(), 2);
        assert_eq!(s.atoms[1].number, 8);
        assert_eq!(s.energy, Some(-1.5));
        assert!(s.atoms.iter().all(|a| a.magmom.is_none()));
        assert!((s.lattice.c() - 10.0).abs() < 1e-12);
    }

    #[test]
    fn test_multiple_frames() {
        let mut buffer = Vec::new();
        write_xyz(&mut buffer, &sample()).unwrap();
        write_xyz(&mut buffer, &sample()).unwrap();
        let frames = read_xyz_frames(Cursor::new(buffer)).unwrap();
        assert_eq!(frames.len(), 2);
    }

    #[test]
    fn test_errors() {
        let missing = "1\nenergy=1.0\nH 0 0 0\n";
        assert!(matches!(
            read_xyz(Cursor::new(missing)),
            Err(XyzError::MissingLattice { line: 2 })
        ));

        let unknown = "1\nLattice=\"1 0 0 0 1 0 0 0 1\"\nQq 0 0 0\n";
        assert!(matches!(
            read_xyz(Cursor::new(unknown)),
            Err(XyzError::UnknownElement { line: 3, .. })
        ));

        let short = "2\nLattice=\"1 0 0 0 1 0 0 0 1\"\nH 0 0 0\n";
        assert!(matches!(
            read_xyz(Cursor::new(short)),
            Err(XyzError::UnexpectedEof)
        ));

        assert!(matches!(
            read_xyz(Cursor::new("x\n")),
            Err(XyzError::InvalidCount { line: 1, .. })
        ));
    }

    #[test]
    fn test_parse_comment() {
        let fields = parse_comment("Lattice=\"1 2 3\" energy=-2.0 flag  pbc=\"T F T\"");
        assert_eq!(fields["lattice"], "1 2 3");
        assert_eq!(fields["energy"], "-2.0");
        assert_eq!(fields["flag"], "");
        assert_eq!(fields["pbc"], "T F T");
    }
}
