//! Parsers for MovieLens data files.
//!
//! Two layouts are supported:
//! - MovieLens 1M `.dat`: `userId::movieId::rating::timestamp`, `movieId::title::genres`
//! - MovieLens latest `.csv`: header row, `userId,movieId,rating,timestamp` and
//!   `movieId,title,genres` (titles may be quoted and contain commas)

use crate::error::{DataLoadError, Result};
use crate::types::*;
use serde::Deserialize;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// On-disk layout of a dataset directory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetFormat {
    /// `ratings.dat` / `movies.dat`
    Dat,
    /// `ratings.csv` / `movies.csv`
    Csv,
}

impl DatasetFormat {
    pub fn ratings_file(&self) -> &'static str {
        match self {
            DatasetFormat::Dat => "ratings.dat",
            DatasetFormat::Csv => "ratings.csv",
        }
    }

    pub fn movies_file(&self) -> &'static str {
        match self {
            DatasetFormat::Dat => "movies.dat",
            DatasetFormat::Csv => "movies.csv",
        }
    }
}

/// Read a file with ISO-8859-1 encoding (Latin-1)
///
/// The MovieLens 1M dataset uses ISO-8859-1, not UTF-8. Every byte maps
/// directly to the Unicode code point of the same value.
fn read_lines_latin1(path: &Path) -> Result<Vec<String>> {
    let mut file = File::open(path).map_err(|_| DataLoadError::FileNotFound {
        path: path.display().to_string(),
    })?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)?;

    let content: String = bytes.iter().map(|&b| b as char).collect();

    Ok(content.lines().map(|s| s.to_string()).collect())
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn next_field<'a>(
    parts: &mut impl Iterator<Item = &'a str>,
    file: &str,
    line: usize,
    name: &str,
) -> Result<&'a str> {
    parts.next().ok_or_else(|| DataLoadError::ParseError {
        file: file.to_string(),
        line,
        reason: format!("Missing {}", name),
    })
}

fn parse_field<T>(value: &str, file: &str, line: usize, name: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e| DataLoadError::ParseError {
        file: file.to_string(),
        line,
        reason: format!("Invalid {}: {}", name, e),
    })
}

/// Parse a `ratings.dat` file
///
/// Format: userId::movieId::rating::timestamp
pub fn parse_ratings_dat(path: &Path) -> Result<Vec<Rating>> {
    let file = file_name(path);
    let lines = read_lines_latin1(path)?;
    let mut ratings = Vec::with_capacity(lines.len());

    for (idx, line) in lines.iter().enumerate() {
        let line_no = idx + 1;
        let line_trimmed = line.trim();
        if line_trimmed.is_empty() {
            continue;
        }
        let mut parts = line_trimmed.split("::");

        let user_id = next_field(&mut parts, &file, line_no, "userId")?;
        let movie_id = next_field(&mut parts, &file, line_no, "movieId")?;
        let rating_value = next_field(&mut parts, &file, line_no, "rating")?;
        let timestamp = next_field(&mut parts, &file, line_no, "timestamp")?;

        ratings.push(Rating {
            user_id: parse_field(user_id, &file, line_no, "userId")?,
            movie_id: parse_field(movie_id, &file, line_no, "movieId")?,
            rating: parse_field(rating_value, &file, line_no, "rating")?,
            timestamp: parse_field(timestamp, &file, line_no, "timestamp")?,
        });
    }
    Ok(ratings)
}

/// Parse a `movies.dat` file
///
/// Format: movieId::title::genres, genres pipe-separated ("Animation|Children's|Comedy")
pub fn parse_movies_dat(path: &Path) -> Result<Vec<Movie>> {
    let file = file_name(path);
    let lines = read_lines_latin1(path)?;
    let mut movies = Vec::with_capacity(lines.len());

    for (idx, line) in lines.iter().enumerate() {
        let line_no = idx + 1;
        let line_trimmed = line.trim();
        if line_trimmed.is_empty() {
            continue;
        }
        let mut parts = line_trimmed.split("::");

        let movie_id = next_field(&mut parts, &file, line_no, "movieId")?;
        let title = next_field(&mut parts, &file, line_no, "title")?;
        let genres = next_field(&mut parts, &file, line_no, "genres")?;

        movies.push(Movie {
            id: parse_field(movie_id, &file, line_no, "movieId")?,
            title: title.to_string(),
            year: extract_year_from_title(title),
            genres: parse_genres(genres),
        });
    }
    Ok(movies)
}

#[derive(Debug, Deserialize)]
struct CsvRating {
    #[serde(rename = "userId")]
    user_id: UserId,
    #[serde(rename = "movieId")]
    movie_id: MovieId,
    rating: f32,
    timestamp: i64,
}

#[derive(Debug, Deserialize)]
struct CsvMovie {
    #[serde(rename = "movieId")]
    movie_id: MovieId,
    title: String,
    genres: String,
}

fn csv_error(file: &str, err: csv::Error) -> DataLoadError {
    let line = err.position().map(|p| p.line() as usize).unwrap_or(0);
    DataLoadError::ParseError {
        file: file.to_string(),
        line,
        reason: err.to_string(),
    }
}

fn open_csv(path: &Path) -> Result<csv::Reader<File>> {
    let file = File::open(path).map_err(|_| DataLoadError::FileNotFound {
        path: path.display().to_string(),
    })?;
    Ok(csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(file))
}

/// Parse a MovieLens `ratings.csv` file (with header row)
pub fn parse_ratings_csv(path: &Path) -> Result<Vec<Rating>> {
    let file = file_name(path);
    let mut reader = open_csv(path)?;

    reader
        .deserialize::<CsvRating>()
        .map(|row| {
            let row = row.map_err(|e| csv_error(&file, e))?;
            Ok(Rating {
                user_id: row.user_id,
                movie_id: row.movie_id,
                rating: row.rating,
                timestamp: row.timestamp,
            })
        })
        .collect()
}

/// Parse a MovieLens `movies.csv` file (with header row)
pub fn parse_movies_csv(path: &Path) -> Result<Vec<Movie>> {
    let file = file_name(path);
    let mut reader = open_csv(path)?;

    reader
        .deserialize::<CsvMovie>()
        .map(|row| {
            let row = row.map_err(|e| csv_error(&file, e))?;
            Ok(Movie {
                id: row.movie_id,
                year: extract_year_from_title(&row.title),
                genres: parse_genres(&row.genres),
                title: row.title,
            })
        })
        .collect()
}

/// Parse the ratings file of a dataset directory in the given format
pub fn parse_ratings(path: &Path, format: DatasetFormat) -> Result<Vec<Rating>> {
    match format {
        DatasetFormat::Dat => parse_ratings_dat(path),
        DatasetFormat::Csv => parse_ratings_csv(path),
    }
}

/// Parse the movies file of a dataset directory in the given format
pub fn parse_movies(path: &Path, format: DatasetFormat) -> Result<Vec<Movie>> {
    match format {
        DatasetFormat::Dat => parse_movies_dat(path),
        DatasetFormat::Csv => parse_movies_csv(path),
    }
}

/// Extract year from movie title
///
/// Example: "Toy Story (1995)" -> Some(1995)
///          "Movie Title" -> None
fn extract_year_from_title(title: &str) -> Option<u16> {
    let title = title.trim();
    let start = title.rfind('(')?;
    let end = title.rfind(')')?;
    if start < end {
        return title[start + 1..end].parse::<u16>().ok();
    }
    None
}

/// Split pipe-separated genres, dropping the "(no genres listed)" placeholder
fn parse_genres(s: &str) -> Vec<String> {
    s.split('|')
        .map(str::trim)
        .filter(|g| !g.is_empty() && *g != "(no genres listed)")
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(name: &str, contents: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("data-loader-{}-{}", name, std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let mut f = File::create(&path).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_extract_year() {
        assert_eq!(extract_year_from_title("Toy Story (1995)"), Some(1995));
        assert_eq!(extract_year_from_title("Babylon 5 (1994) "), Some(1994));
        assert_eq!(extract_year_from_title("Movie Title"), None);
    }

    #[test]
    fn test_parse_genres() {
        assert_eq!(parse_genres("Action|Sci-Fi"), vec!["Action", "Sci-Fi"]);
        assert!(parse_genres("(no genres listed)").is_empty());
    }

    #[test]
    fn test_parse_ratings_dat() {
        let path = write_temp("ratings.dat", "1::1193::5::978300760\n\n2::661::3::978302109\n");
        let ratings = parse_ratings_dat(&path).unwrap();
        assert_eq!(ratings.len(), 2);
        assert_eq!(ratings[0].movie_id, 1193);
        assert_eq!(ratings[1].rating, 3.0);
    }

    #[test]
    fn test_parse_ratings_dat_bad_line() {
        let path = write_temp("bad_ratings.dat", "1::1193::5::978300760\n1::x::5::1\n");
        let err = parse_ratings_dat(&path).unwrap_err();
        assert!(matches!(err, DataLoadError::ParseError { line: 2, .. }));
    }

    #[test]
    fn test_parse_csv() {
        let ratings = write_temp(
            "ratings.csv",
            "userId,movieId,rating,timestamp\n1,1,4.0,964982703\n1,3,3.5,964981247\n",
        );
        let movies = write_temp(
            "movies.csv",
            "movieId,title,genres\n1,Toy Story (1995),Adventure|Animation\n11,\"American President, The (1995)\",Comedy|Drama\n",
        );

        let ratings = parse_ratings_csv(&ratings).unwrap();
        assert_eq!(ratings.len(), 2);
        assert_eq!(ratings[1].rating, 3.5);

        let movies = parse_movies_csv(&movies).unwrap();
        assert_eq!(movies[1].title, "American President, The (1995)");
        assert_eq!(movies[1].year, Some(1995));
        assert_eq!(movies[0].genres.len(), 2);
    }

    #[test]
    fn test_missing_file() {
        let err = parse_ratings_csv(Path::new("/definitely/not/here.csv")).unwrap_err();
        assert!(matches!(err, DataLoadError::FileNotFound { .. }));
    }
}
