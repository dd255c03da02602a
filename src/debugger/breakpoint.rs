use crate::debugger::error::Error;
use itertools::Itertools;
use std::path::{Path, PathBuf};

/// User breakpoint at a source line.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Breakpoint {
    pub file: PathBuf,
    /// Line number, starts from 1.
    pub line: u32,
    pub condition: Option<String>,
    /// Breakpoint number assigned by the debugger, known after the `break` response.
    pub handle: Option<u32>,
}

impl Breakpoint {
    pub fn new(file: impl Into<PathBuf>, line: u32) -> Result<Self, Error> {
        if line == 0 {
            return Err(Error::InvalidLine(line));
        }
        Ok(Self {
            file: file.into(),
            line,
            condition: None,
            handle: None,
        })
    }

    /// Location in gdb syntax: `"<file>":<line>`, always with `/` separators.
    pub fn location(&self) -> String {
        let file = self.file.to_string_lossy().replace('\\', "/");
        format!("\"{file}\":{}", self.line)
    }

    /// Arguments of the `break` command.
    pub fn break_args(&self) -> String {
        match self.condition.as_deref() {
            Some(cond) if !cond.is_empty() => format!("{} if {cond}", self.location()),
            _ => self.location(),
        }
    }

    /// Arguments of the `cond` command, condition is removed when `None`.
    pub fn cond_args(&self) -> String {
        let target = self.handle.unwrap_or(self.line);
        match self.condition.as_deref() {
            Some(cond) if !cond.is_empty() => format!("{target} {cond}"),
            _ => target.to_string(),
        }
    }

    fn is_at(&self, file: &Path, line: u32) -> bool {
        self.line == line && self.file == file
    }
}

/// Ordered breakpoint list. Several breakpoints may share one location.
#[derive(Default, Debug)]
pub struct BreakpointStore {
    breakpoints: Vec<Breakpoint>,
}

impl BreakpointStore {
    pub fn add(&mut self, brkpt: Breakpoint) -> usize {
        self.breakpoints.push(brkpt);
        self.breakpoints.len() - 1
    }

    /// Remove every breakpoint at a location.
    pub fn remove(&mut self, file: &Path, line: u32) -> Vec<Breakpoint> {
        let (removed, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.breakpoints)
            .into_iter()
            .partition(|b| b.is_at(file, line));
        self.breakpoints = kept;
        removed
    }

    pub fn remove_at(&mut self, index: usize) -> Result<Breakpoint, Error> {
        if index >= self.breakpoints.len() {
            return Err(Error::BreakpointNotFound(index));
        }
        Ok(self.breakpoints.remove(index))
    }

    /// Remove all breakpoints of a file.
    pub fn remove_file(&mut self, file: &Path) -> Vec<Breakpoint> {
        let (removed, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.breakpoints)
            .into_iter()
            .partition(|b| b.file == file);
        self.breakpoints = kept;
        removed
    }

    pub fn set_condition(
        &mut self,
        index: usize,
        condition: Option<String>,
    ) -> Result<&Breakpoint, Error> {
        let brkpt = self
            .breakpoints
            .get_mut(index)
            .ok_or(Error::BreakpointNotFound(index))?;
        brkpt.condition = condition.filter(|c| !c.is_empty());
        Ok(brkpt)
    }

    /// Remember the debugger number of the first breakpoint at location without one.
    pub fn set_handle(&mut self, file: &Path, line: u32, handle: u32) {
        if let Some(brkpt) = self
            .breakpoints
            .iter_mut()
            .find(|b| b.handle.is_none() && b.is_at(file, line))
        {
            brkpt.handle = Some(handle);
        }
    }

    /// Forget all debugger numbers, they are valid for one session only.
    pub fn reset_handles(&mut self) {
        self.breakpoints.iter_mut().for_each(|b| b.handle = None);
    }

    /// Drop breakpoints with a location already seen earlier in the list.
    /// Return the number of removed breakpoints.
    pub fn dedup(&mut self) -> usize {
        let before = self.breakpoints.len();
        self.breakpoints = std::mem::take(&mut self.breakpoints)
            .into_iter()
            .unique_by(|b| (b.file.clone(), b.line))
            .collect();
        before - self.breakpoints.len()
    }

    pub fn get(&self, index: usize) -> Option<&Breakpoint> {
        self.breakpoints.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Breakpoint> {
        self.breakpoints.iter()
    }

    pub fn len(&self) -> usize {
        self.breakpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakpoints.is_empty()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn brkpt(file: &str, line: u32) -> Breakpoint {
        Breakpoint::new(file, line).unwrap()
    }

    #[test]
    fn test_zero_line_rejected() {
        assert!(matches!(
            Breakpoint::new("main.c", 0),
            Err(Error::InvalidLine(0))
        ));
    }

    #[test]
    fn test_command_args() {
        struct TestCase {
            brkpt: Breakpoint,
            break_args: &'static str,
            cond_args: &'static str,
        }
        let cases = [
            TestCase {
                brkpt: brkpt("src/main.c", 10),
                break_args: "\"src/main.c\":10",
                cond_args: "10",
            },
            TestCase {
                brkpt: Breakpoint {
                    condition: Some("i > 3".to_string()),
                    ..brkpt("C:\\dev\\main.c", 7)
                },
                break_args: "\"C:/dev/main.c\":7 if i > 3",
                cond_args: "7 i > 3",
            },
            TestCase {
                brkpt: Breakpoint {
                    condition: Some("x".to_string()),
                    handle: Some(2),
                    ..brkpt("a.c", 1)
                },
                break_args: "\"a.c\":1 if x",
                cond_args: "2 x",
            },
        ];

        for tc in cases {
            assert_eq!(tc.brkpt.break_args(), tc.break_args);
            assert_eq!(tc.brkpt.cond_args(), tc.cond_args);
        }
    }

    #[test]
    fn test_duplicates_allowed_until_dedup() {
        let mut store = BreakpointStore::default();
        store.add(brkpt("a.c", 1));
        store.add(brkpt("a.c", 1));
        store.add(brkpt("b.c", 1));
        assert_eq!(store.len(), 3);

        assert_eq!(store.dedup(), 1);
        let locations: Vec<_> = store.iter().map(|b| b.location()).collect();
        assert_eq!(locations, vec!["\"a.c\":1", "\"b.c\":1"]);
    }

    #[test]
    fn test_remove() {
        let mut store = BreakpointStore::default();
        store.add(brkpt("a.c", 1));
        store.add(brkpt("a.c", 2));
        store.add(brkpt("b.c", 3));
        store.add(brkpt("a.c", 4));

        assert!(store.remove(Path::new("a.c"), 9).is_empty());
        let removed = store.remove(Path::new("a.c"), 2);
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].line, 2);
        assert!(matches!(
            store.remove_at(10),
            Err(Error::BreakpointNotFound(10))
        ));

        let removed = store.remove_file(Path::new("a.c"));
        assert_eq!(removed.len(), 2);
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(0).unwrap().file, PathBuf::from("b.c"));
    }

    #[test]
    fn test_remove_all_at_location() {
        let mut store = BreakpointStore::default();
        store.add(brkpt("a.c", 1));
        store.add(brkpt("b.c", 1));
        store.add(brkpt("a.c", 1));

        let removed = store.remove(Path::new("a.c"), 1);
        assert_eq!(removed.len(), 2);
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(0).unwrap().file, PathBuf::from("b.c"));
    }

    #[test]
    fn test_handles() {
        let mut store = BreakpointStore::default();
        store.add(brkpt("a.c", 1));
        store.add(brkpt("a.c", 1));

        store.set_handle(Path::new("a.c"), 1, 1);
        store.set_handle(Path::new("a.c"), 1, 2);
        let handles: Vec<_> = store.iter().map(|b| b.handle).collect();
        assert_eq!(handles, vec![Some(1), Some(2)]);

        store.reset_handles();
        assert!(store.iter().all(|b| b.handle.is_none()));
    }

    #[test]
    fn test_set_condition() {
        let mut store = BreakpointStore::default();
        store.add(brkpt("a.c", 5));
        let b = store.set_condition(0, Some("n == 2".to_string())).unwrap();
        assert_eq!(b.condition.as_deref(), Some("n == 2"));
        let b = store.set_condition(0, Some(String::new())).unwrap();
        assert_eq!(b.condition, None);
        assert!(store.set_condition(1, None).is_err());
    }
}
