// Log audit: every tracing call in the crate is extracted and checked
// against identifiers that would leak patient details or key material.
// Addresses, content hashes, categories and stages are the only things a
// log line may carry.
