fn main() {
    labdata_pipeline::cli::run();
}
