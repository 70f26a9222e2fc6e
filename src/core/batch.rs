use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobLine {
    pub line_no: usize,
    pub text: String,
}

/// Reads a job file: one job per line, `#` comments, blank lines skipped,
/// and a trailing `\` joining a line with the next.
pub fn read_job_lines(path: &Path) -> Result<Vec<JobLine>, io::Error> {
    let file = File::open(path)?;
    parse_job_lines(BufReader::new(file))
}

pub fn parse_job_lines<R: BufRead>(reader: R) -> Result<Vec<JobLine>, io::Error> {
    let mut jobs = Vec::new();
    let mut current = String::new();
    let mut start_line = 0;

    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();

        if current.is_empty() && (trimmed.is_empty() || trimmed.starts_with('#')) {
            continue;
        }
        if current.is_empty() {
            start_line = idx + 1;
        }

        if let Some(stripped) = trimmed.strip_suffix('\\') {
            current.push_str(stripped.trim());
            current.push(' ');
            continue;
        }

        current.push_str(trimmed);
        let text = current.trim().to_string();
        if !text.is_empty() {
            jobs.push(JobLine {
                line_no: start_line,
                text,
            });
        }
        current.clear();
    }

    let text = current.trim().to_string();
    if !text.is_empty() {
        jobs.push(JobLine {
            line_no: start_line,
            text,
        });
    }

    Ok(jobs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn comments_blanks_and_continuations() {
        let input = "\
# nightly plots
--name ssd1 -a 123 \\
    -t /mnt/ssd1 -d /mnt/hdd1

--name ssd2 -a 123 -t /mnt/ssd2 -d /mnt/hdd2 \\
";
        let jobs = parse_job_lines(Cursor::new(input)).unwrap();
        assert_eq!(
            jobs,
            vec![
                JobLine {
                    line_no: 2,
                    text: "--name ssd1 -a 123 -t /mnt/ssd1 -d /mnt/hdd1".to_string(),
                },
                JobLine {
                    line_no: 5,
                    text: "--name ssd2 -a 123 -t /mnt/ssd2 -d /mnt/hdd2".to_string(),
                },
            ]
        );
    }

    #[test]
    fn reads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobs.flw");
        std::fs::write(&path, "--name only -a 1 -t /t -d /d\n").unwrap();
        let jobs = read_job_lines(&path).unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].line_no, 1);
    }
}
