//! Polyline annotations drawn over the map in pixel space.
//!
//! Points are never snapped to hexes, so a path is unaffected by resizes.

use hexatlas_protocol::{Path, Point, DEFAULT_PATH_COLOR, DEFAULT_PATH_STROKE_WIDTH};

/// A new empty path named after the current count.
pub fn create_path(existing: &[Path]) -> Path {
    Path {
        id: crate::new_id("path"),
        name: format!("Path {}", existing.len() + 1),
        color: DEFAULT_PATH_COLOR.to_string(),
        stroke_width: DEFAULT_PATH_STROKE_WIDTH,
        points: Vec::new(),
    }
}

/// Prepends a fresh path so the newest sorts first. Returns the new list and
/// the created path's id.
pub fn add_path(paths: &[Path]) -> (Vec<Path>, String) {
    let path = create_path(paths);
    let id = path.id.clone();
    let mut out = Vec::with_capacity(paths.len() + 1);
    out.push(path);
    out.extend_from_slice(paths);
    (out, id)
}

fn map_path(paths: &[Path], id: &str, f: impl FnOnce(&mut Path)) -> Vec<Path> {
    let mut out = paths.to_vec();
    if let Some(p) = out.iter_mut().find(|p| p.id == id) {
        f(p);
    }
    out
}

pub fn append_point(paths: &[Path], id: &str, point: Point) -> Vec<Path> {
    map_path(paths, id, |p| p.points.push(point))
}

pub fn remove_last_point(paths: &[Path], id: &str) -> Vec<Path> {
    map_path(paths, id, |p| {
        p.points.pop();
    })
}

/// Replaces the path with the same id. Unknown ids leave the list unchanged.
pub fn update_path(paths: &[Path], path: Path) -> Vec<Path> {
    let id = path.id.clone();
    map_path(paths, &id, |p| *p = path)
}

pub fn delete_path(paths: &[Path], id: &str) -> Vec<Path> {
    paths.iter().filter(|p| p.id != id).cloned().collect()
}

pub fn find_path<'a>(paths: &'a [Path], id: &str) -> Option<&'a Path> {
    paths.iter().find(|p| p.id == id)
}

/// Polyline length in pixels.
pub fn path_length(path: &Path) -> f64 {
    path.points
        .windows(2)
        .map(|w| (w[1].x - w[0].x).hypot(w[1].y - w[0].y))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_paths_are_named_by_count_and_prepended() {
        let (paths, first) = add_path(&[]);
        let (paths, second) = add_path(&paths);
        assert_eq!(paths.len(), 2);
        assert_eq!(paths[0].id, second);
        assert_eq!(paths[0].name, "Path 2");
        assert_eq!(paths[1].id, first);
        assert_eq!(paths[1].name, "Path 1");
        assert_ne!(first, second);
        assert!(paths[0].points.is_empty());
        assert_eq!(paths[0].color, DEFAULT_PATH_COLOR);
    }

    #[test]
    fn append_then_remove_restores_points() {
        let (paths, id) = add_path(&[]);
        let paths = append_point(&paths, &id, Point::new(1.0, 2.0));
        let before = paths.clone();
        let grown = append_point(&paths, &id, Point::new(-4.5, 9.0));
        assert_eq!(grown[0].points.len(), 2);
        assert_eq!(grown[0].points[1], Point::new(-4.5, 9.0));
        assert_eq!(remove_last_point(&grown, &id), before);
    }

    #[test]
    fn point_ops_on_missing_or_empty_are_noops() {
        let (paths, id) = add_path(&[]);
        assert_eq!(remove_last_point(&paths, &id), paths);
        assert_eq!(append_point(&paths, "nope", Point::new(0.0, 0.0)), paths);
        assert_eq!(remove_last_point(&paths, "nope"), paths);
    }

    #[test]
    fn update_and_delete_by_id() {
        let (paths, a) = add_path(&[]);
        let (paths, b) = add_path(&paths);
        let mut edited = find_path(&paths, &a).unwrap().clone();
        edited.name = "Old road".to_string();
        edited.stroke_width = 6.0;
        let paths = update_path(&paths, edited.clone());
        assert_eq!(find_path(&paths, &a), Some(&edited));

        let paths = delete_path(&paths, &b);
        assert_eq!(paths.len(), 1);
        assert!(find_path(&paths, &b).is_none());
        assert_eq!(delete_path(&paths, "missing"), paths);
    }

    #[test]
    fn length_sums_segments() {
        let (paths, id) = add_path(&[]);
        let paths = append_point(&paths, &id, Point::new(0.0, 0.0));
        let paths = append_point(&paths, &id, Point::new(3.0, 4.0));
        let paths = append_point(&paths, &id, Point::new(3.0, 10.0));
        assert!((path_length(&paths[0]) - 11.0).abs() < 1e-9);
    }
}
