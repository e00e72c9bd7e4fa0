/// Position in the source text. 32 bits should be enough for everyone.
type Pos = u32;

/// A marker in the source text, containing the index, column, and line number.
///
/// Lines are counted from 1, columns from 0, as `yaml-rust2` reports them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Marker {
    idx: Pos,
    col: Pos,
    line: Pos,
}

impl Marker {
    pub fn new(idx: Pos, col: Pos, line: Pos) -> Self {
        Self { idx, col, line }
    }

    pub fn idx(&self) -> Pos {
        self.idx
    }

    pub fn col(&self) -> Pos {
        self.col
    }

    pub fn line(&self) -> Pos {
        self.line
    }
}

impl From<yaml_rust2::scanner::Marker> for Marker {
    fn from(mark: yaml_rust2::scanner::Marker) -> Self {
        Self {
            idx: mark.index() as Pos,
            col: mark.col() as Pos,
            line: mark.line() as Pos,
        }
    }
}

impl std::fmt::Display for Marker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "line {}, column {}", self.line, self.col + 1)
    }
}

/// Value that remembers where in the source text it started.
#[derive(Debug)]
pub struct Marked<T> {
    value: T,
    mark: Marker,
}

impl<T> Marked<T> {
    pub fn new(value: T, mark: Marker) -> Self {
        Self { value, mark }
    }

    pub fn mark(&self) -> Marker {
        self.mark
    }

    pub fn split(self) -> (T, Marker) {
        (self.value, self.mark)
    }

    pub fn into_inner(self) -> T {
        self.value
    }
}

impl<T> std::ops::Deref for Marked<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.value
    }
}

impl<T> std::ops::DerefMut for Marked<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.value
    }
}

/// Equality ignores the position, so the same key written twice compares equal.
impl<T> std::cmp::PartialEq for Marked<T>
where
    T: PartialEq,
{
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl<T> Clone for Marked<T>
where
    T: Clone,
{
    fn clone(&self) -> Self {
        Self {
            value: self.value.clone(),
            mark: self.mark,
        }
    }
}

impl<T> Default for Marked<T>
where
    T: Default,
{
    fn default() -> Self {
        Self {
            value: Default::default(),
            mark: Marker::default(),
        }
    }
}
