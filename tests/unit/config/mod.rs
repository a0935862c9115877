pub mod definition_test;
