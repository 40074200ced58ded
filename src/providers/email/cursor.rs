//! "Everything after the cursor" filtering over a provider page.

/// Where the scan currently is relative to the cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    /// Cursor not seen yet; items are dropped.
    Seeking,
    /// Cursor seen (or absent); items are kept.
    Collecting,
}

/// Two-phase filter: drop items until the one whose id equals the cursor,
/// drop that one too, then keep the rest in order.
///
/// With no cursor every item is kept. A cursor that never appears keeps
/// nothing.
#[derive(Debug)]
pub struct CursorScan<'a> {
    cursor: Option<&'a str>,
    state: ScanState,
}

impl<'a> CursorScan<'a> {
    pub fn new(cursor: Option<&'a str>) -> Self {
        let cursor = cursor.filter(|c| !c.is_empty());
        let state = match cursor {
            Some(_) => ScanState::Seeking,
            None => ScanState::Collecting,
        };
        Self { cursor, state }
    }

    /// Feeds one id; returns whether the item should be kept.
    pub fn accept(&mut self, id: &str) -> bool {
        match self.state {
            ScanState::Collecting => true,
            ScanState::Seeking => {
                if self.cursor == Some(id) {
                    self.state = ScanState::Collecting;
                }
                false
            }
        }
    }

    /// Whether the cursor has been passed.
    pub fn found(&self) -> bool {
        self.state == ScanState::Collecting
    }

    /// Applies the scan to a whole page.
    pub fn filter<T, F>(mut self, items: Vec<T>, id_of: F) -> Vec<T>
    where
        F: Fn(&T) -> &str,
    {
        items
            .into_iter()
            .filter(|item| self.accept(id_of(item)))
            .collect()
    }
}

/// Convenience wrapper over [`CursorScan::filter`].
pub fn after_cursor<T, F>(items: Vec<T>, cursor: Option<&str>, id_of: F) -> Vec<T>
where
    F: Fn(&T) -> &str,
{
    CursorScan::new(cursor).filter(items, id_of)
}
