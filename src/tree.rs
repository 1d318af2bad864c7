//! Module graph visualization for `buildr graph`.
//!
//! ```text
//! Units (topological order)
//!   ┌───┬──────────────────┬───────────┬─────────┐
//!   │ # │ Source           │ Kind      │ Exports │
//!   ...
//! app
//! └── src/main.cpp
//!     └── hello (src/hello.cppm)
//! ```

use crate::build::graph::Graph;
use crate::build::unit::UnitId;
use crate::build::{load_config, load_graph};
use crate::ui::Table;
use anyhow::Result;
use colored::*;
use std::path::Path;

pub fn print_graph(project_dir: &Path) -> Result<()> {
    let config = load_config(project_dir)?;
    let graph = load_graph(project_dir, &config, false)?;

    println!("{}", "Units (topological order)".bold());
    units_table(&graph, project_dir).print();
    println!();
    print!("{}", render_tree(&graph, &config.package.name, project_dir));
    Ok(())
}

fn units_table(graph: &Graph, root: &Path) -> Table {
    let mut table = Table::new(&["#", "Source", "Kind", "Exports", "Imports"]);
    for &id in graph.topological_order() {
        let unit = graph.unit(id);
        table.add_row(vec![
            id.to_string(),
            display_path(&unit.path, root),
            unit.kind.to_string(),
            unit.exports.clone().unwrap_or_else(|| "-".into()),
            if unit.imports.is_empty() {
                "-".into()
            } else {
                unit.imports.join(", ")
            },
        ]);
    }
    table
}

/// Every unit nothing depends on is a root; each root expands into the
/// units it imports. Subtrees already printed are shown once and then
/// marked `(*)`.
pub fn render_tree(graph: &Graph, name: &str, root: &Path) -> String {
    let mut out = format!("{}\n", name.bold().cyan());
    let roots: Vec<UnitId> = (0..graph.len())
        .filter(|&id| graph.dependents(id).is_empty())
        .collect();
    let mut seen = vec![false; graph.len()];
    for (i, &id) in roots.iter().enumerate() {
        render_node(graph, id, root, "", i + 1 == roots.len(), &mut seen, &mut out);
    }
    out
}

fn render_node(
    graph: &Graph,
    id: UnitId,
    root: &Path,
    prefix: &str,
    is_last: bool,
    seen: &mut [bool],
    out: &mut String,
) {
    let unit = graph.unit(id);
    let branch = if is_last { "└──" } else { "├──" };
    let label = match &unit.exports {
        Some(module) => format!("{} ({})", module.bold(), display_path(&unit.path, root).dimmed()),
        None => display_path(&unit.path, root),
    };

    let deps = graph.dependencies(id);
    if seen[id] && !deps.is_empty() {
        out.push_str(&format!("{}{} {} {}\n", prefix, branch, label, "(*)".dimmed()));
        return;
    }
    seen[id] = true;
    out.push_str(&format!("{}{} {}\n", prefix, branch, label));

    let child_prefix = format!("{}{}", prefix, if is_last { "    " } else { "│   " });
    for (i, &dep) in deps.iter().enumerate() {
        render_node(graph, dep, root, &child_prefix, i + 1 == deps.len(), seen, out);
    }
}

fn display_path(path: &Path, root: &Path) -> String {
    path.strip_prefix(root).unwrap_or(path).display().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::graph::GraphOptions;
    use crate::build::scanner::scan_source;

    #[test]
    fn test_render_tree_nests_imports() {
        colored::control::set_override(false);
        let root = Path::new("/p");
        let units = vec![
            scan_source("/p/src/base.cppm", "export module base;").unwrap(),
            scan_source("/p/src/hello.cppm", "export module hello;\nimport base;").unwrap(),
            scan_source("/p/src/main.cpp", "import base;\nimport hello;\nint main() {}").unwrap(),
        ];
        let graph = Graph::build(units, &GraphOptions::default()).unwrap();

        let tree = render_tree(&graph, "app", root);
        assert_eq!(
            tree,
            "app\n\
             └── src/main.cpp\n    \
             ├── base (src/base.cppm)\n    \
             └── hello (src/hello.cppm)\n        \
             └── base (src/base.cppm)\n"
        );
    }

    #[test]
    fn test_units_table_lists_every_unit() {
        colored::control::set_override(false);
        let units = vec![
            scan_source("/p/a.cppm", "export module a;").unwrap(),
            scan_source("/p/b.cpp", "import a;").unwrap(),
        ];
        let graph = Graph::build(units, &GraphOptions::default()).unwrap();
        let out = units_table(&graph, Path::new("/p")).render(200);
        assert!(out.contains("a.cppm"));
        assert!(out.contains("interface"));
        assert!(out.contains("b.cpp"));
    }
}
