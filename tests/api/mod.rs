mod docs_test;
mod endpoint_test;
