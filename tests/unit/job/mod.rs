// Job File Tests
// Loading and running YAML/JSON join jobs
