fn main() {
    driving_style::cli::run();
}
