use std::cmp::Reverse;
use std::collections::HashSet;
use std::fmt::{Debug, Formatter};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use bit_set::BitSet;
use instant::{Duration, Instant};
use log::{debug, info};
use smallvec::{smallvec, SmallVec};
use thiserror::Error;

/// The expected maximum length for a single word.
pub const MAX_WORD_LENGTH: usize = 21;

/// Edge length of the puzzle grid unless the caller asks for another one.
pub const DEFAULT_GRID_SIZE: usize = 15;

/// An identifier for a given word, based on its index in the config's `words`
/// field.
pub type WordId = usize;

/// Zero-indexed row and column coords for a cell in the grid, where row 0 is
/// the top row.
type GridCoord = (usize, usize);

/// Direction that a placed word is facing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Across,
    Down,
}

impl Direction {
    /// Coord of the cell `offset` steps along this direction from `start`.
    fn step(self, (row, col): GridCoord, offset: usize) -> GridCoord {
        match self {
            Direction::Across => (row, col + offset),
            Direction::Down => (row + offset, col),
        }
    }
}

/// A single word that can be placed into the grid, kept as its normalized
/// uppercase text plus the letter sequence the fill works on.
#[derive(Debug, Clone)]
pub struct Word {
    pub text: String,
    pub letters: SmallVec<[char; MAX_WORD_LENGTH]>,
}

impl Word {
    fn new(text: String) -> Word {
        let letters = text.chars().collect();
        Word { text, letters }
    }
}

/// Error type for the file collaborators around the fill. The fill itself
/// cannot fail: a word that fits nowhere is simply left unplaced.
#[derive(Debug, Error)]
pub enum PuzzleError {
    #[error("could not read word list from {}", path.display())]
    WordListUnavailable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("could not write puzzle to {}", path.display())]
    PuzzleUnwritable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// The aspects of a generation run that are static during filling: the grid
/// size, the skeleton pivot, and the normalized word list.
pub struct PuzzleConfig {
    pub size: usize,
    pub pivot: usize,
    pub words: Vec<Word>,
}

impl Debug for PuzzleConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PuzzleConfig")
            .field("size", &self.size)
            .field("pivot", &self.pivot)
            .field("words", &format!("({} entries)", self.words.len()))
            .finish()
    }
}

/// Build the static inputs for a fill run from a raw word list: normalize to
/// uppercase, drop duplicates (the first occurrence wins), and sort the
/// survivors longest-first, keeping input order between equal lengths. Longer
/// words constrain the grid the most, so committing them first prunes the
/// search early.
///
/// The skeleton pivot is derived from the longest word, clamped to the grid;
/// callers that want a different skeleton can overwrite the field before
/// filling.
pub fn generate_puzzle_config(word_list: &[String], size: usize) -> PuzzleConfig {
    let mut seen: HashSet<String> = HashSet::with_capacity(word_list.len());
    let mut words: Vec<Word> = Vec::with_capacity(word_list.len());

    for token in word_list {
        let text = token.trim().to_uppercase();
        if text.is_empty() || !seen.insert(text.clone()) {
            continue;
        }
        words.push(Word::new(text));
    }

    words.sort_by_key(|word| Reverse(word.letters.len()));

    let longest = words.first().map(|word| word.letters.len()).unwrap_or(1);
    let pivot = longest.min(size).max(1) - 1;

    PuzzleConfig { size, pivot, words }
}

/// The square letter grid being filled. A cell is either a placed letter or
/// empty; there is exactly one empty sentinel, shared by never-written and
/// undone cells, so the fit check's accept condition stays uniform.
#[derive(Debug, Clone)]
pub struct Grid {
    size: usize,
    cells: Vec<Option<char>>,
}

impl Grid {
    fn new(size: usize) -> Grid {
        Grid { size, cells: vec![None; size * size] }
    }

    /// Edge length of the grid.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Contents of the cell at the given coord.
    pub fn cell(&self, (row, col): GridCoord) -> Option<char> {
        assert!(
            row < self.size && col < self.size,
            "cell ({}, {}) out of range for a {}x{} grid",
            row,
            col,
            self.size,
            self.size,
        );
        self.cells[row * self.size + col]
    }

    fn set_cell(&mut self, (row, col): GridCoord, letter: char) {
        assert!(
            row < self.size && col < self.size,
            "cell ({}, {}) out of range for a {}x{} grid",
            row,
            col,
            self.size,
            self.size,
        );
        self.cells[row * self.size + col] = Some(letter);
    }

    fn clear_cell(&mut self, (row, col): GridCoord) {
        self.cells[row * self.size + col] = None;
    }
}

/// Turn the given grid into a rendered string, one row per line with `.` for
/// empty cells.
pub fn render_grid(grid: &Grid) -> String {
    (0..grid.size())
        .map(|row| {
            (0..grid.size())
                .map(|col| grid.cell((row, col)).unwrap_or('.'))
                .collect::<String>()
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// A word committed to the grid, recorded with everything needed to take it
/// back out again.
#[derive(Debug, Clone)]
pub struct Placement {
    pub word_id: WordId,
    pub start: GridCoord,
    pub dir: Direction,
    pub len: usize,
    /// Commit-order index of this placement's entry in the word map.
    pub map_index: usize,
    /// Cells that were empty before this commit. Undo clears exactly these,
    /// leaving crossing letters from earlier placements intact.
    introduced: SmallVec<[GridCoord; MAX_WORD_LENGTH]>,
}

impl Placement {
    /// Generate the coords for each cell of this placement.
    pub fn cell_coords(&self) -> Vec<GridCoord> {
        (0..self.len).map(|offset| self.dir.step(self.start, offset)).collect()
    }
}

/// A struct tracking statistics about the filling process.
#[derive(Debug, Clone)]
pub struct Statistics {
    pub states: u64,
    pub backtracks: u64,
    pub duration: Duration,
}

/// Live state of a single fill run: the shared grid, the growing anchor
/// list, and the bookkeeping that makes undo possible. All mutation goes
/// through the commit/undo pair, so backtracking is an O(word length)
/// operation rather than a grid copy.
struct FillState<'a> {
    config: &'a PuzzleConfig,

    grid: Grid,

    /// Candidate start positions, in registration order: the skeleton first,
    /// then one entry per cell of every committed word. The list only ever
    /// grows; undoing a word leaves its anchors behind. Duplicates are
    /// permitted and merely cost a few extra fit checks.
    anchors: Vec<GridCoord>,

    /// Which words are currently on the grid.
    used: BitSet,

    /// The commits currently on the grid, in commit order. Undo pops from the
    /// back, matching the search's recursion.
    placements: Vec<Placement>,

    /// One entry per commit the run has ever made. Undoing a word blanks its
    /// entry; the index is never reused.
    word_map: Vec<Option<WordId>>,

    statistics: Statistics,
}

impl<'a> FillState<'a> {
    fn new(config: &'a PuzzleConfig) -> FillState<'a> {
        // Seed the anchor skeleton: the pivot row, the pivot column, and the
        // anti-diagonal through their crossing.
        let mut anchors = Vec::new();
        for row in 0..config.size {
            for col in 0..config.size {
                if row == config.pivot || col == config.pivot || row + col == 2 * config.pivot {
                    anchors.push((row, col));
                }
            }
        }

        FillState {
            config,
            grid: Grid::new(config.size),
            anchors,
            used: BitSet::with_capacity(config.words.len()),
            placements: Vec::with_capacity(config.words.len()),
            word_map: Vec::with_capacity(config.words.len()),
            statistics: Statistics {
                states: 0,
                backtracks: 0,
                duration: Duration::from_millis(0),
            },
        }
    }

    /// Whether `word_id` can be written starting at `start` in `dir` against
    /// the current grid contents: every cell in reach must be empty or
    /// already hold the matching letter. This is the single rule that makes
    /// crossing words agree and keeps two different letters out of one cell.
    fn fits(&self, word_id: WordId, start: GridCoord, dir: Direction) -> bool {
        let word = &self.config.words[word_id];
        let (row, col) = start;

        let in_bounds = match dir {
            Direction::Across => col + word.letters.len() <= self.grid.size(),
            Direction::Down => row + word.letters.len() <= self.grid.size(),
        };
        if !in_bounds {
            return false;
        }

        word.letters.iter().enumerate().all(|(offset, &letter)| {
            match self.grid.cell(dir.step(start, offset)) {
                None => true,
                Some(existing) => existing == letter,
            }
        })
    }

    /// First feasible direction at `start` for `word_id`, trying Across then
    /// Down.
    fn first_fit(&self, word_id: WordId, start: GridCoord) -> Option<Direction> {
        if self.fits(word_id, start, Direction::Across) {
            Some(Direction::Across)
        } else if self.fits(word_id, start, Direction::Down) {
            Some(Direction::Down)
        } else {
            None
        }
    }

    /// Write `word_id` into the grid. Every occupied cell becomes a new
    /// anchor so that later words can cross this one, the word joins the
    /// used set, and the word map gains an entry at the next commit index.
    /// Assumes `fits` was already confirmed; does not re-validate.
    fn commit(&mut self, word_id: WordId, start: GridCoord, dir: Direction) {
        let config = self.config;
        let word = &config.words[word_id];

        let mut introduced: SmallVec<[GridCoord; MAX_WORD_LENGTH]> = smallvec![];
        for (offset, &letter) in word.letters.iter().enumerate() {
            let coord = dir.step(start, offset);
            if self.grid.cell(coord).is_none() {
                introduced.push(coord);
            }
            self.grid.set_cell(coord, letter);
            self.anchors.push(coord);
        }

        self.used.insert(word_id);
        self.word_map.push(Some(word_id));
        self.placements.push(Placement {
            word_id,
            start,
            dir,
            len: word.letters.len(),
            map_index: self.word_map.len() - 1,
            introduced,
        });
        self.statistics.states += 1;

        debug!("placed {} at ({}, {}) {:?}", word.text, start.0, start.1, dir);
    }

    /// The exact inverse of the most recent `commit`: cells this placement
    /// introduced go back to empty while cells shared with earlier words
    /// keep their letter, the word map entry is blanked without reusing its
    /// index, and the word leaves the used set. Anchors are never removed.
    fn undo(&mut self, word_id: WordId) {
        let placement = self.placements.pop().unwrap_or_else(|| {
            panic!("undo of {} without a matching commit?", self.config.words[word_id].text)
        });
        debug_assert_eq!(placement.word_id, word_id);

        for &coord in &placement.introduced {
            self.grid.clear_cell(coord);
        }
        self.word_map[placement.map_index] = None;
        self.used.remove(word_id);
        self.statistics.backtracks += 1;

        debug!("removed {}", self.config.words[word_id].text);
    }

    /// Recursively place every word from `index` on, backtracking through
    /// the anchor list on failure. The scan is bounded to the anchors known
    /// when it starts; anchors registered by this word's own commits are
    /// picked up by the deeper calls instead, which keeps retries of
    /// duplicate anchors from extending the scan indefinitely.
    fn place_rest(&mut self, index: usize) -> bool {
        if index >= self.config.words.len() {
            return true;
        }
        if self.used.contains(index) {
            return self.place_rest(index + 1);
        }

        let anchor_count = self.anchors.len();
        for anchor_idx in 0..anchor_count {
            let start = self.anchors[anchor_idx];

            if let Some(dir) = self.first_fit(index, start) {
                self.commit(index, start, dir);
                if self.place_rest(index + 1) {
                    return true;
                }
                self.undo(index);
            }
        }

        false
    }

    /// Top-level driver. Words are visited longest-first; for each one the
    /// current anchors are tried in registration order and the first
    /// feasible direction is committed. A word that fits nowhere is left
    /// unplaced and the scan moves on, so a partial covering survives the
    /// run. The run stops as soon as every word is used, or at the first
    /// branch that commits every remaining word.
    fn place_words(&mut self) {
        let total = self.config.words.len();

        for word_id in 0..total {
            if self.used.contains(word_id) {
                continue;
            }

            let anchor_count = self.anchors.len();
            for anchor_idx in 0..anchor_count {
                let start = self.anchors[anchor_idx];

                if let Some(dir) = self.first_fit(word_id, start) {
                    self.commit(word_id, start, dir);
                    if self.used.len() == total {
                        return;
                    }
                    if self.place_rest(word_id + 1) {
                        return;
                    }
                    self.undo(word_id);
                }
            }
        }
    }
}

/// A struct representing the results of a fill run.
#[derive(Debug)]
pub struct FillResult {
    pub grid: Grid,
    pub placements: Vec<Placement>,
    pub word_map: Vec<Option<WordId>>,
    pub statistics: Statistics,
    pub word_count: usize,
}

impl FillResult {
    /// Number of words on the finished grid.
    pub fn placed_count(&self) -> usize {
        self.placements.len()
    }

    /// Whether every word in the run's list was placed.
    pub fn is_complete(&self) -> bool {
        self.placements.len() == self.word_count
    }
}

/// Run the backtracking fill for the given config. Always produces a result;
/// `placed_count` tells how much of the word list made it onto the grid.
pub fn find_fill(config: &PuzzleConfig) -> FillResult {
    let start = Instant::now();

    let mut state = FillState::new(config);
    state.place_words();
    state.statistics.duration = start.elapsed();

    info!(
        "placed {}/{} words: {} states, {} backtracks in {:?}",
        state.placements.len(),
        config.words.len(),
        state.statistics.states,
        state.statistics.backtracks,
        state.statistics.duration,
    );

    FillResult {
        grid: state.grid,
        placements: state.placements,
        word_map: state.word_map,
        statistics: state.statistics,
        word_count: config.words.len(),
    }
}

/// Read a whitespace-separated word list from a file. Tokens are passed
/// through as-is; normalization happens in `generate_puzzle_config`.
pub fn load_word_list(path: &Path) -> Result<Vec<String>, PuzzleError> {
    let contents = fs::read_to_string(path).map_err(|source| PuzzleError::WordListUnavailable {
        path: path.to_path_buf(),
        source,
    })?;

    Ok(contents.split_whitespace().map(str::to_string).collect())
}

/// Write the finished puzzle: the grid as space-separated rows with `.` for
/// empty cells, a blank line, then the word map as `index word` lines in
/// commit order. Blanked entries print an empty word.
pub fn write_puzzle(
    path: &Path,
    config: &PuzzleConfig,
    result: &FillResult,
) -> Result<(), PuzzleError> {
    let mut out = String::new();

    for row in 0..result.grid.size() {
        let cells: Vec<String> = (0..result.grid.size())
            .map(|col| result.grid.cell((row, col)).unwrap_or('.').to_string())
            .collect();
        out.push_str(&cells.join(" "));
        out.push('\n');
    }
    out.push('\n');

    for (index, entry) in result.word_map.iter().enumerate() {
        let word = entry.map(|word_id| config.words[word_id].text.as_str()).unwrap_or("");
        out.push_str(&format!("{} {}\n", index, word));
    }

    fs::write(path, out).map_err(|source| PuzzleError::PuzzleUnwritable {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    use crate::{
        find_fill, generate_puzzle_config, load_word_list, render_grid, write_puzzle, Direction,
        FillResult, FillState, Grid, PuzzleConfig, PuzzleError,
    };

    fn config(words: &[&str], size: usize) -> PuzzleConfig {
        let words: Vec<String> = words.iter().map(|word| word.to_string()).collect();
        generate_puzzle_config(&words, size)
    }

    /// Reading the grid along each placement must reproduce the placed word
    /// exactly. Because a cell holds a single letter, this also proves that
    /// any two placements sharing a cell agree on it.
    fn assert_placements_read_back(config: &PuzzleConfig, result: &FillResult) {
        for placement in &result.placements {
            let word = &config.words[placement.word_id];
            for (coord, &letter) in placement.cell_coords().iter().zip(&word.letters) {
                assert_eq!(
                    result.grid.cell(*coord),
                    Some(letter),
                    "{} does not read back at {:?}",
                    word.text,
                    coord,
                );
            }
        }
    }

    #[test]
    fn sorts_longest_first_keeping_input_order() {
        let config = config(&["at", "cat", "dog"], 15);

        let texts: Vec<&str> = config.words.iter().map(|word| word.text.as_str()).collect();
        assert_eq!(texts, vec!["CAT", "DOG", "AT"]);
    }

    #[test]
    fn dedups_case_normalized_words() {
        let config = config(&["cat", "CAT", "Cat"], 15);

        assert_eq!(config.words.len(), 1);
        assert_eq!(config.words[0].text, "CAT");
    }

    #[test]
    fn derives_pivot_from_longest_word() {
        assert_eq!(config(&["house"], 15).pivot, 4);
        assert_eq!(config(&[], 15).pivot, 0);
        // Longer than the grid: the pivot clamps to the last row/column.
        assert_eq!(config(&["AAAAAAAAAAAAAAAAAAAA"], 15).pivot, 14);
    }

    #[test]
    fn empty_word_list_terminates_immediately() {
        let config = config(&[], 3);

        let result = find_fill(&config);

        assert!(result.is_complete());
        assert!(result.placements.is_empty());
        assert!(result.word_map.is_empty());
        assert_eq!(render_grid(&result.grid), "...\n...\n...");
    }

    #[test]
    fn places_single_word_on_the_skeleton() {
        let config = config(&["SOLO"], 15);

        let result = find_fill(&config);

        assert!(result.is_complete());
        assert_eq!(result.placements[0].start, (0, 3));
        assert_eq!(result.placements[0].dir, Direction::Across);
        assert_placements_read_back(&config, &result);
    }

    #[test]
    fn crossing_words_share_letters() {
        let config = config(&["CAT", "AT", "CAR"], 15);

        let result = find_fill(&config);

        assert!(result.is_complete());
        assert_eq!(result.placed_count(), 3);
        // The longest word is committed first.
        assert_eq!(result.word_map[0], Some(0));
        assert_placements_read_back(&config, &result);
    }

    #[test]
    fn too_long_word_is_left_unplaced() {
        let config = config(&["AAAAAAAAAAAAAAAAAAAA"], 15);

        let result = find_fill(&config);

        assert_eq!(result.placed_count(), 0);
        assert!(!result.is_complete());
        assert!(result.word_map.is_empty());
        assert!(render_grid(&result.grid).chars().all(|c| c == '.' || c == '\n'));
    }

    #[test]
    fn duplicate_word_is_placed_once() {
        let config = config(&["A", "A"], 15);

        let result = find_fill(&config);

        assert_eq!(config.words.len(), 1);
        assert_eq!(result.placed_count(), 1);
        assert!(result.is_complete());
    }

    #[test]
    fn partial_covering_survives_when_full_cover_is_impossible() {
        // On a 2x2 grid the two words can never coexist: they would need to
        // share a cell with different letters wherever they cross.
        let config = config(&["AB", "CD"], 2);

        let result = find_fill(&config);

        assert_eq!(result.placed_count(), 1);
        assert!(!result.is_complete());
        // Both failed attempts at the first word keep their blanked map
        // entries; the surviving word gets a fresh index.
        assert_eq!(result.word_map, vec![None, None, Some(1)]);
        assert_eq!(render_grid(&result.grid), ".C\n.D");
    }

    #[test]
    fn undo_restores_fit_behavior_without_touching_crossings() {
        let config = config(&["CAT", "CAR"], 15);
        let mut state = FillState::new(&config);

        state.commit(0, (0, 2), Direction::Across);
        assert!(state.fits(1, (0, 2), Direction::Down));

        state.commit(1, (0, 2), Direction::Down);
        state.undo(1);

        // The shared cell keeps the earlier word's letter; the cells the
        // undone word introduced are empty again.
        assert_eq!(state.grid.cell((0, 2)), Some('C'));
        assert_eq!(state.grid.cell((1, 2)), None);
        assert_eq!(state.grid.cell((2, 2)), None);
        assert!(state.fits(1, (0, 2), Direction::Down));
        assert!(!state.used.contains(1));
    }

    #[test]
    fn word_map_indices_are_never_reused() {
        let config = config(&["CAT"], 15);
        let mut state = FillState::new(&config);

        state.commit(0, (0, 2), Direction::Across);
        state.undo(0);
        assert_eq!(state.word_map, vec![None]);

        state.commit(0, (2, 0), Direction::Across);
        assert_eq!(state.word_map, vec![None, Some(0)]);
    }

    #[test]
    fn anchors_only_ever_grow() {
        let config = config(&["CAT"], 15);
        let mut state = FillState::new(&config);
        let skeleton_count = state.anchors.len();

        state.commit(0, (0, 2), Direction::Across);
        assert_eq!(state.anchors.len(), skeleton_count + 3);

        state.undo(0);
        assert_eq!(state.anchors.len(), skeleton_count + 3);
    }

    #[test]
    fn fits_rejects_conflicts_and_out_of_bounds() {
        let config = config(&["ABC", "XYZ"], 3);
        let mut state = FillState::new(&config);
        state.commit(0, (0, 0), Direction::Across);

        // Conflicting letter on an occupied cell.
        assert!(!state.fits(1, (0, 0), Direction::Across));
        assert!(!state.fits(1, (0, 0), Direction::Down));
        // Would run off the right or bottom edge.
        assert!(!state.fits(1, (1, 1), Direction::Across));
        assert!(!state.fits(1, (1, 0), Direction::Down));
        // Still room directly below.
        assert!(state.fits(1, (1, 0), Direction::Across));
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn grid_reports_out_of_range_cells() {
        let grid = Grid::new(3);
        grid.cell((3, 0));
    }

    #[test]
    fn loads_whitespace_separated_word_list() {
        let path = std::env::temp_dir().join("wordgrid_test_words.txt");
        fs::write(&path, "cat dog\nbird").expect("could not write test input");

        let words = load_word_list(&path).expect("load failed");

        assert_eq!(words, vec!["cat", "dog", "bird"]);
    }

    #[test]
    fn missing_word_list_reports_input_error() {
        let err = load_word_list(Path::new("/definitely/missing/words.txt"))
            .expect_err("loaded a missing file??");

        assert!(matches!(err, PuzzleError::WordListUnavailable { .. }));
    }

    #[test]
    fn writes_grid_then_blank_line_then_word_map() {
        let config = config(&["CAT", "AT", "CAR"], 15);
        let result = find_fill(&config);

        let path = std::env::temp_dir().join("wordgrid_test_puzzle.txt");
        write_puzzle(&path, &config, &result).expect("write failed");

        let contents = fs::read_to_string(&path).expect("could not read back output");
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 15 + 1 + 3);
        assert_eq!(lines[0].split(' ').count(), 15);
        assert_eq!(lines[15], "");
        assert_eq!(lines[16], "0 CAT");
        assert!(lines[17].starts_with("1 "));
        assert!(lines[18].starts_with("2 "));
    }
}
