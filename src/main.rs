use std::io::{self, BufRead, Write};
use std::process::ExitCode;

use clap::Parser;

use crate::adjacency_lists::Graph;
use crate::config::Cli;
use crate::edge_input::TokenReader;
use crate::errors::Result;
use crate::path_search::PathQuery;

mod errors {
    use thiserror::Error;

    #[derive(Debug, Error)]
    pub enum ExplorerError {
        #[error("expected an integer, found `{token}`")]
        Parse { token: String },

        #[error("input ended while reading {expected}")]
        UnexpectedEof { expected: &'static str },

        #[error("unknown node {0}")]
        UnknownNode(i64),

        #[error("{what} limit of {limit} exceeded")]
        CapacityExceeded { what: &'static str, limit: usize },

        #[error("total path cost does not fit in a 64-bit integer")]
        CostOverflow,

        #[error(transparent)]
        Io(#[from] std::io::Error),

        #[error("edge file: {0}")]
        Csv(#[from] csv::Error),
    }

    pub type Result<T> = std::result::Result<T, ExplorerError>;
}

mod config {
    use std::path::PathBuf;

    use clap::Parser;

    use crate::adjacency_lists::GraphLimits;

    /// Enumerate every simple path between two nodes that avoids a forbidden node.
    #[derive(Debug, Parser)]
    #[command(name = "path_explorer", version, about)]
    pub struct Cli {
        /// Load edges from a CSV file with a `node1,node2,cost` header instead of prompting
        #[arg(long, value_name = "FILE")]
        pub edges: Option<PathBuf>,

        /// Start node (prompted for when omitted)
        #[arg(long, requires = "end", allow_negative_numbers = true)]
        pub start: Option<i64>,

        /// End node (prompted for when omitted)
        #[arg(long, requires = "start", allow_negative_numbers = true)]
        pub end: Option<i64>,

        /// Forbidden node (prompted for when omitted)
        #[arg(long, allow_negative_numbers = true)]
        pub forbidden: Option<i64>,

        /// Lift the 50 node / 10 neighbour limits
        #[arg(long)]
        pub unbounded: bool,

        /// Print diagnostics to stderr
        #[arg(long, short = 'v')]
        pub verbose: bool,
    }

    impl Cli {
        pub fn limits(&self) -> GraphLimits {
            if self.unbounded {
                GraphLimits::unbounded()
            } else {
                GraphLimits::default()
            }
        }
    }
}

mod edge_input {
    use std::collections::VecDeque;
    use std::io::{BufRead, Write};
    use std::path::Path;

    use serde::Deserialize;

    use crate::errors::{ExplorerError, Result};

    pub const TERMINATOR: i64 = -9;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
    pub struct EdgeRecord {
        pub node1: i64,
        pub node2: i64,
        pub cost: i64,
    }

    impl EdgeRecord {
        pub fn is_terminator(&self) -> bool {
            self.node1 == TERMINATOR && self.node2 == TERMINATOR && self.cost == TERMINATOR
        }
    }

    // scanf-style reader: whitespace-separated tokens that may span any number of lines
    pub struct TokenReader<R> {
        reader: R,
        pending: VecDeque<String>,
    }

    impl<R: BufRead> TokenReader<R> {
        pub fn new(reader: R) -> Self {
            Self {
                reader,
                pending: VecDeque::new(),
            }
        }

        fn next_token(&mut self) -> Result<Option<String>> {
            while self.pending.is_empty() {
                let mut line = String::new();
                if self.reader.read_line(&mut line)? == 0 {
                    return Ok(None); // end of input
                }
                self.pending
                    .extend(line.split_whitespace().map(str::to_string));
            }
            Ok(self.pending.pop_front())
        }

        pub fn next_int(&mut self, expected: &'static str) -> Result<i64> {
            match self.next_token()? {
                Some(token) => token.parse().map_err(|_| ExplorerError::Parse { token }),
                None => Err(ExplorerError::UnexpectedEof { expected }),
            }
        }
    }

    fn prompt<W: Write>(out: &mut W, message: &str) -> Result<()> {
        write!(out, "{}", message)?;
        out.flush()?;
        Ok(())
    }

    // None once the -9 -9 -9 terminator is entered
    pub fn prompt_edge<R: BufRead, W: Write>(
        tokens: &mut TokenReader<R>,
        out: &mut W,
    ) -> Result<Option<EdgeRecord>> {
        prompt(out, "Enter node 1, node 2, and edge cost (-9 -9 -9 to terminate): ")?;
        let edge = EdgeRecord {
            node1: tokens.next_int("node 1")?,
            node2: tokens.next_int("node 2")?,
            cost: tokens.next_int("edge cost")?,
        };
        if edge.is_terminator() {
            return Ok(None);
        }
        Ok(Some(edge))
    }

    pub fn prompt_start_end<R: BufRead, W: Write>(
        tokens: &mut TokenReader<R>,
        out: &mut W,
    ) -> Result<(i64, i64)> {
        prompt(out, "Enter the start and end node: ")?;
        let start = tokens.next_int("start node")?;
        let end = tokens.next_int("end node")?;
        Ok((start, end))
    }

    pub fn prompt_forbidden<R: BufRead, W: Write>(
        tokens: &mut TokenReader<R>,
        out: &mut W,
    ) -> Result<i64> {
        prompt(out, "Enter the forbidden node: ")?;
        tokens.next_int("forbidden node")
    }

    pub fn read_edges_csv(file_path: &Path) -> Result<Vec<EdgeRecord>> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(file_path)?;

        let mut edges = Vec::new();
        for row in reader.deserialize() {
            let edge: EdgeRecord = row?;
            if edge.is_terminator() {
                break; // same sentinel as the interactive prompt
            }
            edges.push(edge);
        }
        Ok(edges)
    }
}

mod adjacency_lists {
    use std::collections::HashMap;

    use crate::errors::{ExplorerError, Result};

    pub const MAX_NODES: usize = 50;
    pub const MAX_NEIGHBORS: usize = 10;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct GraphLimits {
        pub max_nodes: Option<usize>,
        pub max_neighbors: Option<usize>,
    }

    impl GraphLimits {
        pub fn unbounded() -> Self {
            Self {
                max_nodes: None,
                max_neighbors: None,
            }
        }
    }

    impl Default for GraphLimits {
        fn default() -> Self {
            Self {
                max_nodes: Some(MAX_NODES),
                max_neighbors: Some(MAX_NEIGHBORS),
            }
        }
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Neighbor {
        pub id: i64,
        pub cost: i64,
    }

    #[derive(Debug, Clone)]
    struct Node {
        id: i64,
        neighbors: Vec<Neighbor>,
    }

    // nodes and neighbour lists keep insertion order, which fixes the path order
    #[derive(Debug, Clone, Default)]
    pub struct Graph {
        nodes: Vec<Node>,
        index: HashMap<i64, usize>, // node id -> position in `nodes`
        limits: GraphLimits,
    }

    impl Graph {
        pub fn with_limits(limits: GraphLimits) -> Self {
            Self {
                nodes: Vec::new(),
                index: HashMap::new(),
                limits,
            }
        }

        pub fn add_node(&mut self, id: i64) -> Result<bool> {
            if self.index.contains_key(&id) {
                return Ok(false); // already registered, nothing to do
            }
            self.check_node_room(1)?;
            self.index.insert(id, self.nodes.len());
            self.nodes.push(Node {
                id,
                neighbors: Vec::new(),
            });
            Ok(true)
        }

        pub fn add_edge(&mut self, id1: i64, id2: i64, cost: i64) -> Result<()> {
            let first = self.position(id1)?;
            let second = self.position(id2)?;
            self.check_neighbor_room(id1, id2)?; // nothing is appended unless both lists have room

            self.nodes[first].neighbors.push(Neighbor { id: id2, cost });
            self.nodes[second].neighbors.push(Neighbor { id: id1, cost }); // undirected, so store both ways
            Ok(())
        }

        // registers both endpoints and adds the edge, or changes nothing on error
        pub fn connect(&mut self, id1: i64, id2: i64, cost: i64) -> Result<()> {
            let mut new_ids = vec![id1, id2];
            new_ids.dedup();
            new_ids.retain(|id| !self.contains(*id));
            self.check_node_room(new_ids.len())?;
            self.check_neighbor_room(id1, id2)?;

            self.add_node(id1)?;
            self.add_node(id2)?;
            self.add_edge(id1, id2, cost)
        }

        fn check_node_room(&self, extra: usize) -> Result<()> {
            if let Some(limit) = self.limits.max_nodes {
                if self.nodes.len() + extra > limit {
                    return Err(ExplorerError::CapacityExceeded { what: "node", limit });
                }
            }
            Ok(())
        }

        fn check_neighbor_room(&self, id1: i64, id2: i64) -> Result<()> {
            if let Some(limit) = self.limits.max_neighbors {
                let has_room = |id: i64, extra: usize| self.neighbors(id).len() + extra <= limit;
                let fits = if id1 == id2 {
                    has_room(id1, 2) // self-loop lands both entries on one list
                } else {
                    has_room(id1, 1) && has_room(id2, 1)
                };
                if !fits {
                    return Err(ExplorerError::CapacityExceeded {
                        what: "neighbour",
                        limit,
                    });
                }
            }
            Ok(())
        }

        fn position(&self, id: i64) -> Result<usize> {
            self.index
                .get(&id)
                .copied()
                .ok_or(ExplorerError::UnknownNode(id))
        }

        pub fn contains(&self, id: i64) -> bool {
            self.index.contains_key(&id)
        }

        pub fn neighbors(&self, id: i64) -> &[Neighbor] {
            match self.index.get(&id) {
                Some(&at) => self.nodes[at].neighbors.as_slice(),
                None => &[], // unregistered ids have no neighbours
            }
        }

        pub fn node_ids(&self) -> impl Iterator<Item = i64> + '_ {
            self.nodes.iter().map(|node| node.id)
        }

        pub fn node_count(&self) -> usize {
            self.nodes.len()
        }

        pub fn edge_count(&self) -> usize {
            let entries: usize = self.nodes.iter().map(|node| node.neighbors.len()).sum();
            entries / 2 // every edge is stored once per endpoint
        }
    }
}

mod path_search {
    use std::collections::HashSet;

    use crate::adjacency_lists::Graph;
    use crate::errors::{ExplorerError, Result};

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PathQuery {
        pub start: i64,
        pub end: i64,
        pub forbidden: i64,
    }

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct PathRecord {
        pub nodes: Vec<i64>,
        pub costs: Vec<i64>, // edge cost into each node, 0 for the start
        pub total_cost: i64,
    }

    struct Frame {
        node: i64,
        cost: i64, // cost of the edge used to reach `node`
        next: usize, // index of the next neighbour to try
    }

    // every simple path from start to end that avoids the forbidden node,
    // in depth-first, neighbour-insertion order
    pub fn find_paths(graph: &Graph, query: PathQuery) -> Result<Vec<PathRecord>> {
        let mut found = Vec::new();
        let mut stack = vec![Frame { node: query.start, cost: 0, next: 0 }]; // start has no incoming edge
        let mut on_path = HashSet::from([query.start]);

        while let Some(&Frame { node, next, .. }) = stack.last() {
            if node == query.end {
                if !on_path.contains(&query.forbidden) {
                    found.push(record_path(&stack)?);
                } // paths through the forbidden node are dropped
                backtrack(&mut stack, &mut on_path);
                continue;
            }

            match graph.neighbors(node).get(next) {
                Some(neighbor) => {
                    let depth = stack.len() - 1;
                    stack[depth].next += 1;
                    if on_path.insert(neighbor.id) {
                        stack.push(Frame { node: neighbor.id, cost: neighbor.cost, next: 0 });
                    } // already on the path, skip it
                }
                None => backtrack(&mut stack, &mut on_path), // neighbours exhausted
            }
        }
        Ok(found)
    }

    fn backtrack(stack: &mut Vec<Frame>, on_path: &mut HashSet<i64>) {
        if let Some(frame) = stack.pop() {
            on_path.remove(&frame.node);
        }
    }

    fn record_path(stack: &[Frame]) -> Result<PathRecord> {
        let nodes: Vec<i64> = stack.iter().map(|frame| frame.node).collect();
        let costs: Vec<i64> = stack.iter().map(|frame| frame.cost).collect();
        let total_cost = costs
            .iter()
            .try_fold(0i64, |sum, &cost| sum.checked_add(cost))
            .ok_or(ExplorerError::CostOverflow)?;
        Ok(PathRecord { nodes, costs, total_cost })
    }
}

mod report {
    use crate::path_search::PathRecord;

    // "Path: 1 2 3 Cost: 10", the cost is left off when it is exactly zero
    pub fn format_path(record: &PathRecord) -> String {
        let nodes = record
            .nodes
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(" ");
        if record.total_cost != 0 {
            format!("Path: {} Cost: {}", nodes, record.total_cost)
        } else {
            format!("Path: {}", nodes)
        }
    }

    pub fn format_count(count: usize) -> String {
        format!("Number of valid paths: {}", count)
    }
}

// diagnostics for --verbose go to `diag`, which is stderr outside of tests
fn run<R: BufRead, W: Write, D: Write>(cli: &Cli, input: R, out: &mut W, diag: &mut D) -> Result<usize> {
    let mut tokens = TokenReader::new(input);
    let mut graph = Graph::with_limits(cli.limits());
    let mut prompted = false; // prompts leave the cursor mid-line

    match &cli.edges {
        Some(file_path) => {
            for edge in edge_input::read_edges_csv(file_path)? {
                graph.connect(edge.node1, edge.node2, edge.cost)?;
            }
        }
        None => {
            prompted = true;
            while let Some(edge) = edge_input::prompt_edge(&mut tokens, out)? {
                graph.connect(edge.node1, edge.node2, edge.cost)?;
            }
        }
    }
    if cli.verbose {
        let ids = graph.node_ids().map(|id| id.to_string()).collect::<Vec<_>>();
        writeln!(
            diag,
            "graph: {} nodes, {} edges [{}]",
            graph.node_count(),
            graph.edge_count(),
            ids.join(" ")
        )?;
    }

    let (start, end) = match (cli.start, cli.end) {
        (Some(start), Some(end)) => (start, end),
        _ => {
            prompted = true;
            edge_input::prompt_start_end(&mut tokens, out)?
        }
    };
    let forbidden = match cli.forbidden {
        Some(forbidden) => forbidden,
        None => {
            prompted = true;
            edge_input::prompt_forbidden(&mut tokens, out)?
        }
    };
    if cli.verbose && !graph.contains(start) {
        writeln!(diag, "note: start node {} has no edges", start)?;
    }

    let paths = path_search::find_paths(&graph, PathQuery { start, end, forbidden })?;
    if prompted {
        writeln!(out)?; // end the prompt line before the report
    }
    for record in &paths {
        writeln!(out, "{}", report::format_path(record))?;
    }
    writeln!(out, "{}", report::format_count(paths.len()))?;
    out.flush()?;

    if cli.verbose {
        writeln!(diag, "search finished: {} valid paths", paths.len())?;
    }
    Ok(paths.len())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let stdin = io::stdin();
    let stdout = io::stdout();
    let stderr = io::stderr();

    match run(&cli, stdin.lock(), &mut stdout.lock(), &mut stderr.lock()) {
        Ok(_) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {}", err);
            ExitCode::FAILURE
        }
    }
}
