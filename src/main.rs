use green_hour::AppConfig;

fn main() {
    green_hour::init_logging();
    std::process::exit(green_hour::app::run(AppConfig::from_env()));
}
