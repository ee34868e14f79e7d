//! Pipeline builder: named nodes, port-level connections, one channel per edge

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::time::Duration;

use tracing::{debug, info};

use super::errors::{ConnectionError, PipelineError};
use super::node::{InputPort, OutputPort, ProcessNode};
use super::ports::PortSchema;
use super::scheduler::{RunReport, Scheduler};
use super::type_registry::TYPE_REGISTRY;
use super::watchdog::{DEFAULT_BLOCKED_THRESHOLD, Watchdog};

pub const DEFAULT_BUFFER_SIZE: usize = 1000;

struct NodeEntry {
    id: usize,
    name: String,
    node: Box<dyn ProcessNode>,
    inputs: Vec<PortSchema>,
    outputs: Vec<PortSchema>,
}

struct PendingConnection {
    from_node: usize,
    from_port: usize,
    to_node: usize,
    to_port: usize,
    type_id: TypeId,
    type_name: &'static str,
    buffer_size: usize,
}

/// Flowgraph under construction
pub struct Pipeline {
    nodes: Vec<NodeEntry>,
    node_names: HashMap<String, usize>,
    connections: Vec<PendingConnection>,
    default_buffer_size: usize,
    watchdog_threshold: Duration,
    watchdog: Option<Watchdog>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            node_names: HashMap::new(),
            connections: Vec::new(),
            default_buffer_size: DEFAULT_BUFFER_SIZE,
            watchdog_threshold: DEFAULT_BLOCKED_THRESHOLD,
            watchdog: None,
        }
    }

    /// Channel capacity used by `connect()`
    pub fn with_default_buffer_size(mut self, size: usize) -> Self {
        self.default_buffer_size = size.max(1);
        self
    }

    /// How long a channel operation may block before the watchdog warns
    pub fn with_watchdog_threshold(mut self, threshold: Duration) -> Self {
        self.watchdog_threshold = threshold;
        self
    }

    /// Monitor this pipeline's channels with an existing watchdog.
    /// Overrides `with_watchdog_threshold`.
    pub fn with_watchdog(mut self, watchdog: Watchdog) -> Self {
        self.watchdog = Some(watchdog);
        self
    }

    /// Add a node under a unique name; ports come from the node's schemas.
    pub fn add_process<N: ProcessNode + 'static>(
        &mut self,
        name: impl Into<String>,
        node: N,
    ) -> Result<(), PipelineError> {
        let name = name.into();
        if self.node_names.contains_key(&name) {
            return Err(PipelineError::DuplicateNode(name));
        }

        let id = self.nodes.len();
        self.node_names.insert(name.clone(), id);
        self.nodes.push(NodeEntry {
            id,
            inputs: node.input_schema(),
            outputs: node.output_schema(),
            name,
            node: Box::new(node),
        });
        Ok(())
    }

    /// Connect `from.from_port` to `to.to_port` with the default buffer size
    pub fn connect(&mut self, from: &str, from_port: &str, to: &str, to_port: &str) -> Result<(), PipelineError> {
        self.connect_with_buffer(from, from_port, to, to_port, self.default_buffer_size)
    }

    pub fn connect_with_buffer(
        &mut self,
        from: &str,
        from_port: &str,
        to: &str,
        to_port: &str,
        buffer_size: usize,
    ) -> Result<(), PipelineError> {
        let from_id = self.node_id(from)?;
        let to_id = self.node_id(to)?;

        let from_schema = find_port(&self.nodes[from_id].outputs, from, from_port)?;
        let to_schema = find_port(&self.nodes[to_id].inputs, to, to_port)?;

        if from_schema.type_id != to_schema.type_id {
            return Err(ConnectionError::TypeMismatch {
                from_node: from.to_string(),
                from_port: from_port.to_string(),
                from_type: from_schema.type_name,
                to_node: to.to_string(),
                to_port: to_port.to_string(),
                to_type: to_schema.type_name,
            }
            .into());
        }

        // Fan-out from an output is fine, fan-in to an input is not
        if self
            .connections
            .iter()
            .any(|c| c.to_node == to_id && c.to_port == to_schema.index)
        {
            return Err(ConnectionError::DuplicateConnection {
                node: to.to_string(),
                port: to_port.to_string(),
            }
            .into());
        }

        let connection = PendingConnection {
            from_node: from_id,
            from_port: from_schema.index,
            to_node: to_id,
            to_port: to_schema.index,
            type_id: from_schema.type_id,
            type_name: from_schema.type_name,
            buffer_size: buffer_size.max(1),
        };
        debug!(
            "Connected {}.{} -> {}.{} ({}, buffer {})",
            from, from_port, to, to_port, connection.type_name, connection.buffer_size
        );
        self.connections.push(connection);
        Ok(())
    }

    fn node_id(&self, name: &str) -> Result<usize, ConnectionError> {
        self.node_names
            .get(name)
            .copied()
            .ok_or_else(|| ConnectionError::NodeNotFound(name.to_string()))
    }

    /// Input ports of a node
    pub fn list_node_inputs(&self, name: &str) -> Result<&[PortSchema], ConnectionError> {
        Ok(&self.nodes[self.node_id(name)?].inputs)
    }

    /// Output ports of a node
    pub fn list_node_outputs(&self, name: &str) -> Result<&[PortSchema], ConnectionError> {
        Ok(&self.nodes[self.node_id(name)?].outputs)
    }

    /// Node names in insertion order
    pub fn list_nodes(&self) -> Vec<&str> {
        self.nodes.iter().map(|n| n.name.as_str()).collect()
    }

    pub fn num_connections(&self) -> usize {
        self.connections.len()
    }

    /// Create the channels, wire the ports and start every node on its own thread.
    pub fn build(self) -> Result<Scheduler, PipelineError> {
        info!(
            "Building pipeline with {} nodes and {} connections",
            self.nodes.len(),
            self.connections.len()
        );

        type PortKey = (usize, usize);
        let mut receivers: HashMap<PortKey, Box<dyn Any + Send>> = HashMap::new();
        let mut senders: HashMap<PortKey, (TypeId, Vec<Box<dyn Any + Send>>)> = HashMap::new();

        // Channels and output wrapping need the registry; node threads do not
        let mut wired: Vec<(NodeEntry, Vec<InputPort>, Vec<OutputPort>)> = Vec::with_capacity(self.nodes.len());
        // Monitoring starts only once wiring has succeeded
        let watchdog = match self.watchdog {
            Some(watchdog) => watchdog,
            None => Watchdog::with_threshold(self.watchdog_threshold),
        };
        {
            let registry = TYPE_REGISTRY.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

            for conn in &self.connections {
                if !registry.is_registered(conn.type_id) {
                    return Err(PipelineError::UnregisteredType(conn.type_name));
                }
                let (tx, rx) = registry
                    .create_channel(conn.type_id, conn.buffer_size)
                    .ok_or(PipelineError::UnregisteredType(conn.type_name))?;
                receivers.insert((conn.to_node, conn.to_port), rx);
                senders
                    .entry((conn.from_node, conn.from_port))
                    .or_insert_with(|| (conn.type_id, Vec::new()))
                    .1
                    .push(tx);
            }

            for entry in self.nodes {
                let node_name = entry.name.clone();

                // Unconnected inputs are allowed; nodes see `get()` return None
                let input_ports: Vec<InputPort> = (0..entry.node.num_inputs())
                    .map(|i| {
                        let port = receivers
                            .remove(&(entry.id, i))
                            .map(InputPort::from_type_erased)
                            .unwrap_or_else(InputPort::unconnected);
                        let port_name = entry.inputs.get(i).map(|s| s.name.clone()).unwrap_or_else(|| format!("in{}", i));
                        port.with_watchdog(&watchdog, &node_name, &port_name)
                    })
                    .collect();

                let mut output_ports = Vec::with_capacity(entry.node.num_outputs());
                for i in 0..entry.node.num_outputs() {
                    let port_name = entry.outputs.get(i).map(|s| s.name.clone()).unwrap_or_else(|| format!("out{}", i));
                    let port = match senders.remove(&(entry.id, i)) {
                        Some((type_id, list)) => registry
                            .wrap_output(type_id, list)
                            .map(OutputPort::from_type_erased)
                            .map_err(|reason| PipelineError::Wiring {
                                node: entry.name.clone(),
                                port: port_name.clone(),
                                reason,
                            })?,
                        None => OutputPort::unconnected(),
                    };
                    output_ports.push(port.with_watchdog(&watchdog, &node_name, &port_name));
                }

                wired.push((entry, input_ports, output_ports));
            }
        }

        let mut scheduler = Scheduler::with_watchdog(watchdog);
        for (entry, inputs, outputs) in wired {
            debug!("Starting node {}: {}", entry.id, entry.name);
            scheduler.start_named_process(entry.name, entry.node, inputs, outputs);
        }

        info!("Pipeline built with {} node threads", scheduler.num_threads());
        Ok(scheduler)
    }

    /// Build, then block until every node has finished.
    pub fn run(self) -> Result<RunReport, PipelineError> {
        Ok(self.build()?.wait())
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

fn find_port<'a>(ports: &'a [PortSchema], node: &str, port: &str) -> Result<&'a PortSchema, ConnectionError> {
    ports
        .iter()
        .find(|s| s.name == port)
        .ok_or_else(|| ConnectionError::PortNotFound {
            node: node.to_string(),
            port: port.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::errors::WorkResult;

    struct ByteSource;
    impl ProcessNode for ByteSource {
        fn name(&self) -> &str {
            "byte_source"
        }
        fn should_stop(&self) -> bool {
            true
        }
        fn num_inputs(&self) -> usize {
            0
        }
        fn num_outputs(&self) -> usize {
            1
        }
        fn output_schema(&self) -> Vec<PortSchema> {
            vec![PortSchema::output::<u8>("out", 0)]
        }
        fn work(&mut self, _inputs: &[InputPort], _outputs: &[OutputPort]) -> WorkResult<usize> {
            Ok(0)
        }
    }

    struct ByteSink;
    impl ProcessNode for ByteSink {
        fn name(&self) -> &str {
            "byte_sink"
        }
        fn should_stop(&self) -> bool {
            true
        }
        fn num_inputs(&self) -> usize {
            1
        }
        fn num_outputs(&self) -> usize {
            0
        }
        fn input_schema(&self) -> Vec<PortSchema> {
            vec![PortSchema::input::<u8>("in", 0)]
        }
        fn work(&mut self, _inputs: &[InputPort], _outputs: &[OutputPort]) -> WorkResult<usize> {
            Ok(0)
        }
    }

    struct WordSink;
    impl ProcessNode for WordSink {
        fn name(&self) -> &str {
            "word_sink"
        }
        fn num_inputs(&self) -> usize {
            1
        }
        fn num_outputs(&self) -> usize {
            0
        }
        fn input_schema(&self) -> Vec<PortSchema> {
            vec![PortSchema::input::<u32>("in", 0)]
        }
        fn work(&mut self, _inputs: &[InputPort], _outputs: &[OutputPort]) -> WorkResult<usize> {
            Ok(0)
        }
    }

    #[test]
    fn test_single_connection() {
        let mut pipeline = Pipeline::new();
        pipeline.add_process("source", ByteSource).unwrap();
        pipeline.add_process("sink", ByteSink).unwrap();

        assert!(pipeline.connect("source", "out", "sink", "in").is_ok());
        assert_eq!(pipeline.num_connections(), 1);
    }

    #[test]
    fn test_duplicate_input_connection_rejected() {
        let mut pipeline = Pipeline::new();
        pipeline.add_process("source1", ByteSource).unwrap();
        pipeline.add_process("source2", ByteSource).unwrap();
        pipeline.add_process("sink", ByteSink).unwrap();

        pipeline.connect("source1", "out", "sink", "in").unwrap();
        let result = pipeline.connect("source2", "out", "sink", "in");
        assert!(matches!(
            result,
            Err(PipelineError::Connection(ConnectionError::DuplicateConnection { .. }))
        ));
        assert!(result.unwrap_err().to_string().contains("already connected"));
    }

    #[test]
    fn test_fan_out_allowed() {
        let mut pipeline = Pipeline::new();
        pipeline.add_process("source", ByteSource).unwrap();
        pipeline.add_process("sink1", ByteSink).unwrap();
        pipeline.add_process("sink2", ByteSink).unwrap();

        assert!(pipeline.connect("source", "out", "sink1", "in").is_ok());
        assert!(pipeline.connect("source", "out", "sink2", "in").is_ok());
    }

    #[test]
    fn test_type_mismatch_rejected() {
        let mut pipeline = Pipeline::new();
        pipeline.add_process("source", ByteSource).unwrap();
        pipeline.add_process("sink", WordSink).unwrap();

        let err = pipeline.connect("source", "out", "sink", "in").unwrap_err();
        assert!(matches!(err, PipelineError::Connection(ConnectionError::TypeMismatch { .. })));
        assert!(err.to_string().contains("u8"));
    }

    #[test]
    fn test_missing_node_and_port() {
        let mut pipeline = Pipeline::new();
        pipeline.add_process("source", ByteSource).unwrap();
        pipeline.add_process("sink", ByteSink).unwrap();

        assert!(matches!(
            pipeline.connect("source", "out", "nowhere", "in"),
            Err(PipelineError::Connection(ConnectionError::NodeNotFound(_)))
        ));
        assert!(matches!(
            pipeline.connect("source", "wrong_port", "sink", "in"),
            Err(PipelineError::Connection(ConnectionError::PortNotFound { .. }))
        ));
    }

    #[test]
    fn test_duplicate_node_name_rejected() {
        let mut pipeline = Pipeline::new();
        assert!(pipeline.add_process("node1", ByteSource).is_ok());
        let err = pipeline.add_process("node1", ByteSource).unwrap_err();
        assert!(err.to_string().contains("already exists"));
    }

    #[test]
    fn test_list_nodes_and_ports() {
        let mut pipeline = Pipeline::new();
        pipeline.add_process("source", ByteSource).unwrap();
        pipeline.add_process("sink", ByteSink).unwrap();

        assert_eq!(pipeline.list_nodes(), vec!["source", "sink"]);
        assert_eq!(pipeline.list_node_outputs("source").unwrap()[0].name, "out");
        assert_eq!(pipeline.list_node_inputs("sink").unwrap()[0].name, "in");
        assert!(pipeline.list_node_inputs("missing").is_err());
    }

    #[test]
    fn test_unregistered_type_fails_build() {
        struct WordSource;
        impl ProcessNode for WordSource {
            fn name(&self) -> &str {
                "word_source"
            }
            fn num_inputs(&self) -> usize {
                0
            }
            fn num_outputs(&self) -> usize {
                1
            }
            fn output_schema(&self) -> Vec<PortSchema> {
                vec![PortSchema::output::<u32>("out", 0)]
            }
            fn work(&mut self, _inputs: &[InputPort], _outputs: &[OutputPort]) -> WorkResult<usize> {
                Ok(0)
            }
        }

        let watchdog = Watchdog::with_threshold(Duration::from_millis(50));
        let mut pipeline = Pipeline::new().with_watchdog(watchdog.clone());
        pipeline.add_process("source", WordSource).unwrap();
        pipeline.add_process("sink", WordSink).unwrap();
        pipeline.connect("source", "out", "sink", "in").unwrap();

        assert!(matches!(pipeline.build(), Err(PipelineError::UnregisteredType(_))));
        // No monitoring thread is left behind by a failed build
        assert!(!watchdog.is_monitoring());
    }

    #[test]
    fn test_built_pipeline_monitors_until_wait() {
        let watchdog = Watchdog::with_threshold(Duration::from_millis(50));
        let pipeline = Pipeline::new().with_watchdog(watchdog.clone());

        let scheduler = pipeline.build().unwrap();
        assert!(watchdog.is_monitoring());
        scheduler.wait();
        assert!(!watchdog.is_monitoring());
    }

    #[test]
    fn test_run_idle_graph_completes() {
        let mut pipeline = Pipeline::new();
        pipeline.add_process("source", ByteSource).unwrap();
        pipeline.add_process("sink", ByteSink).unwrap();
        pipeline.connect("source", "out", "sink", "in").unwrap();

        let report = pipeline.run().unwrap();
        assert_eq!(report.nodes.len(), 2);
        assert!(report.is_success());
    }
}
